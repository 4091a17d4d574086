//! Plantbot - 植物群聊机器人
//!
//! 入口：初始化日志、加载配置、组装分发引擎，按配置以长轮询或 Webhook 接收消息，
//! 并在后台运行定时通知与读数接口（POST /readings），直到 Ctrl+C / SIGTERM。
//!
//! 环境变量:
//! - TELEGRAM_BOT_TOKEN: Bot Token（也可写在 [telegram] bot_token）
//! - TELEGRAM_GROUP_CHAT_ID: 默认群聊 ID
//! - OPENAI_API_KEY: LLM API Key（[llm] mock = true 时不需要）
//!
//! 启动: cargo run -- [config.toml]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use plantbot::config::{load_config, ReceiveMode};
use plantbot::core::{run_until_shutdown, BotError, ShutdownManager, ShutdownReason};
use plantbot::dispatch::{run_scheduled_notifications, DispatchEngine};
use plantbot::integrations::sensor_api::{create_sensor_router, SensorApiState};
use plantbot::integrations::telegram::{create_router, run_polling, TelegramTransport, TelegramWebhookState};
use plantbot::llm::{LlmClient, MessageGenerator, MockLlmClient, OpenAiClient, PersonaGenerator};
use plantbot::observability;
use plantbot::plants::{demo_readings, InMemorySensors, PlantRegistry, StaticRegistry};

/// 启动 HTTP 服务；绑定失败或服务异常退出都以 FatalError 触发关闭
async fn serve_http(addr: SocketAddr, app: Router, shutdown: Arc<ShutdownManager>) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            shutdown.shutdown(ShutdownReason::FatalError(format!("failed to bind {}: {}", addr, e)));
            return;
        }
    };
    tracing::info!("HTTP server listening on http://{}", addr);

    let token = shutdown.token();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(token.cancelled_owned())
        .await
    {
        shutdown.shutdown(ShutdownReason::FatalError(format!("HTTP server error: {}", e)));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;
    config.validate()?;

    let token = config.telegram.resolve_token().ok_or_else(|| {
        BotError::config("Telegram bot token is required (telegram.bot_token or TELEGRAM_BOT_TOKEN)")
    })?;
    let transport = Arc::new(TelegramTransport::new(&token, &config.telegram.api_base)?);

    let llm: Arc<dyn LlmClient> = if config.llm.mock {
        tracing::warn!("Using mock LLM client, replies are echoes");
        Arc::new(MockLlmClient::new())
    } else {
        Arc::new(OpenAiClient::from_config(&config.llm))
    };
    let generator: Arc<dyn MessageGenerator> = Arc::new(PersonaGenerator::new(llm.clone()));
    let registry: Arc<dyn PlantRegistry> = Arc::new(StaticRegistry::from_config(&config.plants));

    let sensors = Arc::new(InMemorySensors::default());
    if config.plants.is_empty() && config.sensors.seed_demo {
        for reading in demo_readings() {
            sensors.record(reading).await;
        }
        tracing::info!("Seeded demo sensor readings");
    }

    let engine = Arc::new(DispatchEngine::from_config(
        &config,
        transport.clone(),
        registry.clone(),
        generator,
        sensors.clone(),
    ));

    let plants = registry.list_plants().await;
    tracing::info!(
        "Plant relay ready with {} plants: {}",
        plants.len(),
        plants.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
    );
    if engine.delivery().default_chat_id().is_none() {
        tracing::warn!("No default chat configured, scheduled notifications will not be delivered");
    }

    let shutdown = Arc::new(ShutdownManager::new());

    if config.scheduler.enabled {
        tokio::spawn(run_scheduled_notifications(
            engine.clone(),
            Duration::from_secs(config.scheduler.interval_secs),
            None,
            shutdown.token(),
        ));
    }

    let sensor_router = create_sensor_router(Arc::new(SensorApiState { sensors, registry }));

    let reason = match config.telegram.mode {
        ReceiveMode::Polling => {
            let addr = SocketAddr::from(([0, 0, 0, 0], config.sensors.ingest_port));
            let polling = run_polling(
                engine,
                transport,
                config.telegram.poll_timeout_secs,
                shutdown.token(),
            );
            let ingest = serve_http(addr, sensor_router, shutdown.clone());
            let app = async move {
                tokio::join!(polling, ingest);
            };
            run_until_shutdown(shutdown, app).await
        }
        ReceiveMode::Webhook => {
            let state = Arc::new(TelegramWebhookState {
                engine,
                secret_token: config.telegram.webhook_secret.clone(),
            });
            let app = create_router(state).merge(sensor_router);

            let addr = SocketAddr::from(([0, 0, 0, 0], config.telegram.webhook_port));
            tracing::info!("Webhook URL: https://YOUR_HOST/webhook");
            run_until_shutdown(shutdown.clone(), serve_http(addr, app, shutdown)).await
        }
    };

    let (prompt, completion, total) = llm.token_usage();
    tracing::info!(prompt, completion, total, "LLM token usage");

    if let Some(ShutdownReason::FatalError(msg)) = reason {
        anyhow::bail!("Plant relay stopped: {}", msg);
    }
    Ok(())
}
