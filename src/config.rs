//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PLANTBOT__*` 覆盖（双下划线表示嵌套，如 `PLANTBOT__DELIVERY__MAX_RETRIES=1`）。
//! Telegram 凭据另可通过 `TELEGRAM_BOT_TOKEN` / `TELEGRAM_GROUP_CHAT_ID` 提供。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::BotError;
use crate::plants::Plant;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub conversation: ConversationSection,
    #[serde(default)]
    pub cooldown: CooldownSection,
    #[serde(default)]
    pub delivery: DeliverySection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub sensors: SensorsSection,
    /// 植物登记表；为空时使用内置的两株演示植物
    #[serde(default)]
    pub plants: Vec<Plant>,
}

/// 接收模式：长轮询（无需公网域名）或 Webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveMode {
    #[default]
    Polling,
    Webhook,
}

/// [telegram] 段
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    pub bot_token: Option<String>,
    /// 默认群聊 ID，投递未指定 chat 时使用
    pub default_chat_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub mode: ReceiveMode,
    /// getUpdates 长轮询超时（秒）
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_webhook_port")]
    pub webhook_port: u16,
    /// setWebhook 的 secret_token，配置后校验 X-Telegram-Bot-Api-Secret-Token 头
    pub webhook_secret: Option<String>,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    25
}

fn default_webhook_port() -> u16 {
    3000
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            bot_token: None,
            default_chat_id: None,
            api_base: default_api_base(),
            mode: ReceiveMode::default(),
            poll_timeout_secs: default_poll_timeout_secs(),
            webhook_port: default_webhook_port(),
            webhook_secret: None,
        }
    }
}

impl TelegramSection {
    /// 配置值优先，其次环境变量 TELEGRAM_BOT_TOKEN
    pub fn resolve_token(&self) -> Option<String> {
        self.bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var("TELEGRAM_BOT_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn resolve_default_chat(&self) -> Option<String> {
        self.default_chat_id
            .clone()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| std::env::var("TELEGRAM_GROUP_CHAT_ID").ok())
            .filter(|c| !c.trim().is_empty())
    }
}

/// [conversation] 段：每株植物的对话历史上限与过期时间
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSection {
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,
}

fn default_max_history() -> usize {
    10
}

fn default_expiry_secs() -> u64 {
    3600
}

impl Default for ConversationSection {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            expiry_secs: default_expiry_secs(),
        }
    }
}

impl ConversationSection {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }
}

/// [cooldown] 段：同一植物两次成功通知的最小间隔
#[derive(Debug, Clone, Deserialize)]
pub struct CooldownSection {
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_cooldown_secs() -> u64 {
    300
}

impl Default for CooldownSection {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl CooldownSection {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// [delivery] 段：重试次数、固定重试间隔、单次请求超时
#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySection {
    /// 总尝试次数（含第一次）
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// [scheduler] 段：定时通知
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    3600
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            interval_secs: default_interval_secs(),
        }
    }
}

/// [llm] 段：OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// 为 true 时使用 Mock 客户端（本地调试无需 API Key）
    #[serde(default)]
    pub mock: bool,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    200
}

fn default_temperature() -> f32 {
    1.1
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            mock: false,
        }
    }
}

/// [sensors] 段：读数来源
#[derive(Debug, Clone, Deserialize)]
pub struct SensorsSection {
    /// 使用演示植物时预置两条演示读数
    #[serde(default = "default_seed_demo")]
    pub seed_demo: bool,
    /// 长轮询模式下读数接口（POST /readings）的端口；Webhook 模式与 webhook_port 共用
    #[serde(default = "default_ingest_port")]
    pub ingest_port: u16,
}

fn default_seed_demo() -> bool {
    true
}

fn default_ingest_port() -> u16 {
    3001
}

impl Default for SensorsSection {
    fn default() -> Self {
        Self {
            seed_demo: default_seed_demo(),
            ingest_port: default_ingest_port(),
        }
    }
}

impl AppConfig {
    /// 启动前校验：非法取值属于配置错误，直接失败
    pub fn validate(&self) -> Result<(), BotError> {
        if self.scheduler.enabled && self.scheduler.interval_secs == 0 {
            return Err(BotError::config(
                "scheduler.interval_secs must be greater than 0 when the scheduler is enabled",
            ));
        }
        if self.delivery.max_retries == 0 {
            return Err(BotError::config(
                "delivery.max_retries counts total attempts and must be at least 1",
            ));
        }
        if self.conversation.max_history == 0 {
            return Err(BotError::config("conversation.max_history must be at least 1"));
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 PLANTBOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PLANTBOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PLANTBOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
