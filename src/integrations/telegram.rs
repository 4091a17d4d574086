//! Telegram Bot API 集成
//!
//! - `TelegramTransport`：通过 sendMessage 投递（实现 `Transport`）
//! - `run_polling`：getUpdates 长轮询，无需公网域名
//! - `create_router`：Webhook 模式，收到更新后立即返回 200，耗时处理在后台执行

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::BotError;
use crate::dispatch::{DispatchEngine, InboundMessage, ParseMode, Transport, TransportError};
use crate::observability::{record_failure, FailureKind};

/// 轮询出错后的等待时间
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Webhook 校验头
const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Bot API 通用响应
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// sendMessage 请求体
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

/// getUpdates 请求体
#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
    allowed_updates: Vec<&'static str>,
}

/// Telegram 更新（只取文本消息需要的字段）
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: Chat,
    pub from: Option<TelegramUser>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub first_name: String,
    #[serde(default)]
    pub is_bot: bool,
}

impl Update {
    /// 转换为入站消息；非文本、空文本或来自机器人的消息返回 None
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        let msg = self.message.as_ref()?;
        if msg.from.as_ref().is_some_and(|u| u.is_bot) {
            return None;
        }
        let text = msg.text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }
        Some(InboundMessage::new(
            msg.chat.id.to_string(),
            text,
            msg.from.as_ref().map(|u| u.first_name.as_str()),
        ))
    }
}

/// 把 HTTP 状态码与响应体映射为传输结果
fn classify_response(status: u16, body: &str) -> Result<(), TransportError> {
    let parsed: Option<ApiResponse<serde_json::Value>> = serde_json::from_str(body).ok();
    let ok = parsed.as_ref().is_some_and(|r| r.ok);
    if (200..300).contains(&status) && ok {
        return Ok(());
    }

    let description = parsed
        .as_ref()
        .and_then(|r| r.description.clone())
        .unwrap_or_else(|| body.chars().take(200).collect());
    if status == 429 {
        let retry_after_secs = parsed
            .as_ref()
            .and_then(|r| r.parameters.as_ref())
            .and_then(|p| p.retry_after);
        return Err(TransportError::RateLimited { retry_after_secs });
    }
    Err(TransportError::Api { status, description })
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

/// Telegram 传输：持有自己的 HTTP 客户端与 Token
pub struct TelegramTransport {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramTransport {
    /// Token 为空属于配置错误，构造时即失败
    pub fn new(token: &str, api_base: &str) -> Result<Self, BotError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(BotError::config(
                "Telegram bot token is required (telegram.bot_token or TELEGRAM_BOT_TOKEN)",
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// 长轮询拉取更新
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TransportError> {
        let req = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: vec!["message"],
        };
        let resp = self
            .client
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(timeout_secs + 10))
            .json(&req)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(map_reqwest_error)?;
        classify_response(status, &body)?;

        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(&body).map_err(|e| TransportError::Api {
            status,
            description: format!("invalid getUpdates payload: {}", e),
        })?;
        Ok(parsed.result.unwrap_or_default())
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: ParseMode,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let req = SendMessageRequest {
            chat_id,
            text,
            parse_mode: parse_mode.as_api_str(),
        };
        let resp = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(timeout)
            .json(&req)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(map_reqwest_error)?;
        classify_response(status, &body)
    }
}

/// 在后台任务中处理一条入站消息
fn spawn_handle(engine: &Arc<DispatchEngine>, inbound: InboundMessage) {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        if !engine.handle_message(&inbound).await {
            tracing::warn!("Reply to chat {} was not delivered", inbound.chat_id);
        }
    });
}

/// getUpdates 长轮询循环，直到 shutdown 触发
pub async fn run_polling(
    engine: Arc<DispatchEngine>,
    transport: Arc<TelegramTransport>,
    poll_timeout_secs: u64,
    shutdown: CancellationToken,
) {
    tracing::info!("Starting bot in polling mode");
    let mut offset = 0i64;

    loop {
        let updates = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Bot polling stopped");
                break;
            }
            result = transport.get_updates(offset, poll_timeout_secs) => result,
        };

        match updates {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    match update.to_inbound() {
                        Some(inbound) => spawn_handle(&engine, inbound),
                        None => tracing::debug!("Ignoring non-text update {}", update.update_id),
                    }
                }
            }
            Err(e) => {
                record_failure(FailureKind::Inbound, None, None, &e);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                }
            }
        }
    }
}

/// Webhook 服务状态
pub struct TelegramWebhookState {
    pub engine: Arc<DispatchEngine>,
    /// setWebhook 时配置的 secret_token；为 None 时不校验
    pub secret_token: Option<String>,
}

/// 创建 Telegram Webhook 路由
pub fn create_router(state: Arc<TelegramWebhookState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook_receive))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// POST /webhook - 接收 Telegram 更新
async fn webhook_receive(
    State(state): State<Arc<TelegramWebhookState>>,
    headers: HeaderMap,
    Json(update): Json<Update>,
) -> StatusCode {
    if let Some(expected) = &state.secret_token {
        let provided = headers
            .get(SECRET_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            tracing::warn!("Telegram webhook: secret token mismatch, rejecting update");
            return StatusCode::UNAUTHORIZED;
        }
    }

    match update.to_inbound() {
        Some(inbound) => {
            tracing::info!(
                "Telegram webhook: accepted update {} chat_id={}, spawning background task",
                update.update_id,
                inbound.chat_id
            );
            spawn_handle(&state.engine, inbound);
        }
        None => tracing::debug!("Telegram webhook: ignoring non-text update {}", update.update_id),
    }

    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::dispatch::delivery::testing::ScriptedTransport;
    use crate::dispatch::{CooldownTracker, DeliveryChannel};
    use crate::llm::{MockLlmClient, PersonaGenerator};
    use crate::memory::ConversationStore;
    use crate::plants::{demo_plants, InMemorySensors, StaticRegistry};

    const TEXT_UPDATE: &str = r#"{
        "update_id": 1001,
        "message": {
            "message_id": 5,
            "chat": {"id": -100123, "type": "group"},
            "from": {"id": 9, "is_bot": false, "first_name": "Martina"},
            "date": 1700000000,
            "text": "Vendula, are you ok?"
        }
    }"#;

    fn engine(transport: Arc<ScriptedTransport>) -> Arc<DispatchEngine> {
        Arc::new(DispatchEngine::new(
            Arc::new(StaticRegistry::new(demo_plants())),
            Arc::new(PersonaGenerator::new(Arc::new(MockLlmClient::with_reply("Never better")))),
            Arc::new(InMemorySensors::default()),
            DeliveryChannel::new(transport, None),
            ConversationStore::default(),
            CooldownTracker::default(),
        ))
    }

    #[test]
    fn test_update_to_inbound() {
        let update: Update = serde_json::from_str(TEXT_UPDATE).unwrap();
        let inbound = update.to_inbound().unwrap();
        assert_eq!(inbound.chat_id, "-100123");
        assert_eq!(inbound.text, "Vendula, are you ok?");
        assert_eq!(inbound.sender.as_deref(), Some("Martina"));
    }

    #[test]
    fn test_non_text_and_bot_updates_ignored() {
        let sticker: Update = serde_json::from_str(
            r#"{"update_id": 1, "message": {"chat": {"id": 1}, "from": {"first_name": "A"}}}"#,
        )
        .unwrap();
        assert!(sticker.to_inbound().is_none());

        let from_bot: Update = serde_json::from_str(
            r#"{"update_id": 2, "message": {"chat": {"id": 1}, "from": {"first_name": "B", "is_bot": true}, "text": "hi"}}"#,
        )
        .unwrap();
        assert!(from_bot.to_inbound().is_none());

        let edited: Update = serde_json::from_str(r#"{"update_id": 3}"#).unwrap();
        assert!(edited.to_inbound().is_none());
    }

    #[test]
    fn test_classify_response() {
        assert!(classify_response(200, r#"{"ok": true, "result": {}}"#).is_ok());
        assert_eq!(
            classify_response(429, r#"{"ok": false, "description": "Too Many Requests", "parameters": {"retry_after": 7}}"#),
            Err(TransportError::RateLimited { retry_after_secs: Some(7) })
        );
        let err = classify_response(400, r#"{"ok": false, "description": "Bad Request: can't parse entities"}"#)
            .unwrap_err();
        assert!(!err.is_retryable());
        let err = classify_response(502, "<html>Bad Gateway</html>").unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, TransportError::Api { description, .. } if description.contains("Bad Gateway")));
    }

    #[test]
    fn test_transport_requires_token() {
        assert!(matches!(
            TelegramTransport::new("  ", "https://api.telegram.org"),
            Err(BotError::Config(_))
        ));
        let transport = TelegramTransport::new("123:abc", "https://api.telegram.org/").unwrap();
        assert_eq!(
            transport.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_send_request_serialization() {
        let req = SendMessageRequest {
            chat_id: "-1",
            text: "hi",
            parse_mode: ParseMode::Plain.as_api_str(),
        };
        assert_eq!(serde_json::to_string(&req).unwrap(), r#"{"chat_id":"-1","text":"hi"}"#);
    }

    #[tokio::test]
    async fn test_webhook_accepts_and_replies() {
        let transport = Arc::new(ScriptedTransport::default());
        let state = Arc::new(TelegramWebhookState {
            engine: engine(transport.clone()),
            secret_token: None,
        });

        let response = create_router(state)
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(TEXT_UPDATE))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        for _ in 0..50 {
            if transport.call_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(transport.chats(), vec!["-100123".to_string()]);
        assert_eq!(transport.sent_texts()[0], "🌱 *Vendula*: \nNever better");
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_secret() {
        let transport = Arc::new(ScriptedTransport::default());
        let state = Arc::new(TelegramWebhookState {
            engine: engine(transport.clone()),
            secret_token: Some("s3cret".to_string()),
        });

        let response = create_router(state)
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .header(SECRET_TOKEN_HEADER, "wrong")
                    .body(Body::from(TEXT_UPDATE))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(transport.call_count(), 0);
    }
}
