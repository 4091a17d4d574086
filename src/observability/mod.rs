//! 可观测性：日志初始化与结构化失败事件
//!
//! 所有吞掉错误的地方都调用 `record_failure`，以 tracing 字段记录 kind / plant_id / attempt。

use std::fmt;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

pub fn init() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .with(tracing_fmt::layer())
        .init();
}

/// 失败事件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 缺少目标群聊等配置
    Config,
    Transport,
    Generation,
    Registry,
    Sensor,
    /// 入站更新解析 / 轮询失败
    Inbound,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Transport => "transport",
            Self::Generation => "generation",
            Self::Registry => "registry",
            Self::Sensor => "sensor",
            Self::Inbound => "inbound",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 记录一次被捕获的失败
pub fn record_failure(
    kind: FailureKind,
    plant_id: Option<i64>,
    attempt: Option<u32>,
    error: &dyn fmt::Display,
) {
    tracing::error!(
        target: "plantbot::failure",
        kind = kind.as_str(),
        plant_id = ?plant_id,
        attempt = ?attempt,
        error = %error,
        "dispatch failure"
    );
}
