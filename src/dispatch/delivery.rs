//! 出站投递：有限次重试 + 固定间隔 + MarkdownV2 转义
//!
//! 状态机：Pending → Sending → {Delivered, Failed}；可重试的传输错误使 Sending 回到 Pending，
//! 最多 max_retries 次尝试。所有传输错误都在此处被捕获、记录并折叠为 bool，不向上传播。
//! 重试之间不保证幂等：消息实际已送达但传输报错时，重试会产生重复消息。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DeliverySection;
use crate::observability::{record_failure, FailureKind};

use super::markup::{bold, escape};

/// 消息格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    MarkdownV2,
    Plain,
}

impl ParseMode {
    /// Bot API 的 parse_mode 字段值；纯文本不带该字段
    pub fn as_api_str(&self) -> Option<&'static str> {
        match self {
            Self::MarkdownV2 => Some("MarkdownV2"),
            Self::Plain => None,
        }
    }
}

/// 传输层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    /// retry_after 仅用于日志；重试间隔始终是固定的 retry_delay
    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    /// API 拒绝（如 400 can't parse entities、403 bot was kicked）
    #[error("API error {status}: {description}")]
    Api { status: u16, description: String },
}

impl TransportError {
    /// 网络错误、超时、429 与 5xx 可重试；其余 API 拒绝重试也不会成功
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
        }
    }
}

/// 消息传输接口（Telegram 等）
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: ParseMode,
        timeout: Duration,
    ) -> Result<(), TransportError>;
}

/// 投递状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Sending,
    Delivered,
    Failed,
}

/// 一次投递请求的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub state: DeliveryState,
    /// 实际发起的传输调用次数
    pub attempts: u32,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        self.state == DeliveryState::Delivered
    }
}

/// 单次尝试（只存在于重试循环内）
#[derive(Debug)]
struct DeliveryAttempt<'a> {
    target_chat: &'a str,
    rendered_text: &'a str,
    attempt_number: u32,
}

/// 投递通道
pub struct DeliveryChannel {
    transport: Arc<dyn Transport>,
    default_chat_id: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
    timeout: Duration,
}

impl DeliveryChannel {
    pub fn new(transport: Arc<dyn Transport>, default_chat_id: Option<String>) -> Self {
        Self::from_config(transport, default_chat_id, &DeliverySection::default())
    }

    pub fn from_config(
        transport: Arc<dyn Transport>,
        default_chat_id: Option<String>,
        config: &DeliverySection,
    ) -> Self {
        Self {
            transport,
            default_chat_id: default_chat_id.filter(|c| !c.trim().is_empty()),
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn default_chat_id(&self) -> Option<&str> {
        self.default_chat_id.as_deref()
    }

    /// 渲染：有 subject 时为 `🌱 *名字*: \n正文`，名字与正文均已转义
    pub fn render(text: &str, subject: Option<&str>) -> String {
        let safe_text = escape(text);
        match subject {
            Some(name) => format!("🌱 {}: \n{}", bold(&escape(name)), safe_text),
            None => safe_text,
        }
    }

    /// 投递消息，成功返回 true
    pub async fn deliver(&self, chat_id: Option<&str>, text: &str, subject: Option<&str>) -> bool {
        self.deliver_with_report(chat_id, text, subject, None)
            .await
            .delivered()
    }

    /// 投递并返回状态与尝试次数；plant_id 仅用于失败事件
    pub async fn deliver_with_report(
        &self,
        chat_id: Option<&str>,
        text: &str,
        subject: Option<&str>,
        plant_id: Option<i64>,
    ) -> DeliveryReport {
        let target = chat_id
            .filter(|c| !c.trim().is_empty())
            .or(self.default_chat_id.as_deref());
        let Some(target_chat) = target else {
            record_failure(
                FailureKind::Config,
                plant_id,
                None,
                &"no chat id specified and no default chat configured",
            );
            return DeliveryReport {
                state: DeliveryState::Failed,
                attempts: 0,
            };
        };

        let rendered = Self::render(text, subject);
        let mut state = DeliveryState::Pending;
        let mut attempts = 0;

        while state == DeliveryState::Pending {
            attempts += 1;
            state = DeliveryState::Sending;
            let attempt = DeliveryAttempt {
                target_chat,
                rendered_text: &rendered,
                attempt_number: attempts,
            };
            tracing::debug!(?attempt, "Sending message");

            match self
                .transport
                .send(
                    attempt.target_chat,
                    attempt.rendered_text,
                    ParseMode::MarkdownV2,
                    self.timeout,
                )
                .await
            {
                Ok(()) => {
                    tracing::info!("Message sent successfully to chat {}", target_chat);
                    state = DeliveryState::Delivered;
                }
                Err(e) => {
                    record_failure(
                        FailureKind::Transport,
                        plant_id,
                        Some(attempt.attempt_number),
                        &format_args!("chat {}: {}", target_chat, e),
                    );
                    if e.is_retryable() && attempts < self.max_retries {
                        state = DeliveryState::Pending;
                        tokio::time::sleep(self.retry_delay).await;
                    } else {
                        state = DeliveryState::Failed;
                    }
                }
            }
        }

        DeliveryReport { state, attempts }
    }
}
