//! 错误类型
//!
//! 配置错误在构造阶段直接返回；传输与生成错误在分发引擎内部被捕获并折叠为成功/失败信号。

use thiserror::Error;

use crate::dispatch::TransportError;

/// 分发引擎及其协作方可能出现的错误
#[derive(Error, Debug)]
pub enum BotError {
    /// 缺少 Bot Token、默认群聊等，构造时即失败，不重试
    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 文本生成（LLM）失败
    #[error("Generation error: {0}")]
    Generation(String),
}

impl BotError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }
}
