//! 分发引擎集成测试：引擎 + 真实存储 + Mock LLM + 记录型传输

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use plantbot::dispatch::{
    CooldownTracker, DeliveryChannel, DeliveryState, DispatchEngine, InboundMessage, ParseMode,
    Transport, TransportError,
};
use plantbot::integrations::sensor_api::{create_sensor_router, SensorApiState};
use plantbot::llm::{MockLlmClient, PersonaGenerator};
use plantbot::memory::{ConversationStore, Role};
use plantbot::plants::{demo_plants, demo_readings, InMemorySensors, SensorReading, StaticRegistry};
use tower::ServiceExt;

/// 按脚本返回结果并记录每次发送的传输
#[derive(Default)]
struct RecordingTransport {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    sent: Mutex<Vec<(String, String, ParseMode)>>,
}

impl RecordingTransport {
    fn scripted(script: Vec<Result<(), TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<(String, String, ParseMode)> {
        self.sent.lock().unwrap().clone()
    }

    fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, text, _)| text).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: ParseMode,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string(), parse_mode));
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

struct Harness {
    engine: DispatchEngine,
    transport: Arc<RecordingTransport>,
    llm: Arc<MockLlmClient>,
    sensors: Arc<InMemorySensors>,
}

fn harness(transport: RecordingTransport, llm: MockLlmClient) -> Harness {
    let transport = Arc::new(transport);
    let llm = Arc::new(llm);
    let sensors = Arc::new(InMemorySensors::default());
    let engine = DispatchEngine::new(
        Arc::new(StaticRegistry::new(demo_plants())),
        Arc::new(PersonaGenerator::new(llm.clone())),
        sensors.clone(),
        DeliveryChannel::new(transport.clone(), Some("-100500".to_string())),
        ConversationStore::new(10, Duration::from_secs(3600)),
        CooldownTracker::new(Duration::from_secs(300)),
    );
    Harness {
        engine,
        transport,
        llm,
        sensors,
    }
}

#[tokio::test(start_paused = true)]
async fn test_conversation_expires_after_an_hour_of_silence() {
    let h = harness(RecordingTransport::default(), MockLlmClient::new());
    let msg = InboundMessage::new("-100500", "Vendula, good morning", Some("Anna"));

    assert!(h.engine.handle_message(&msg).await);
    tokio::time::advance(Duration::from_secs(600)).await;
    assert!(h.engine.handle_message(&msg).await);

    // 第二次提示词带上了第一次的对话
    let prompts = h.llm.prompts();
    assert_eq!(prompts[0].len(), 2);
    assert_eq!(prompts[1].len(), 3);
    assert_eq!(prompts[1][1].role, Role::System);
    assert!(prompts[1][1].content.contains("Anna: good morning"));

    tokio::time::advance(Duration::from_secs(3601)).await;
    assert!(h.engine.handle_message(&msg).await);
    assert_eq!(h.llm.prompts()[2].len(), 2);
    assert_eq!(h.engine.conversations().len(1).await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_history_keeps_only_latest_entries() {
    let h = harness(RecordingTransport::default(), MockLlmClient::new());

    for i in 0..6 {
        let msg = InboundMessage::new("-100500", format!("Bobeš, message {}", i), Some("Martina"));
        assert!(h.engine.handle_message(&msg).await);
    }

    let history = h.engine.conversations().get_history(2).await;
    assert_eq!(history.len(), 10);
    assert_eq!(history[0], "Martina: message 1");
    assert_eq!(history[9], "Bobeš: Echo from Mock: Martina: message 5");
}

#[tokio::test(start_paused = true)]
async fn test_names_resolve_without_diacritics() {
    let h = harness(RecordingTransport::default(), MockLlmClient::with_reply("Leave me alone"));

    assert!(
        h.engine
            .handle_message(&InboundMessage::new("7", "BOBES are you thirsty?", None))
            .await
    );
    assert_eq!(h.transport.texts(), vec!["🌱 *Bobeš*: \nLeave me alone".to_string()]);
    assert_eq!(
        h.engine.conversations().get_history(2).await[0],
        "User: are you thirsty?"
    );
}

#[tokio::test(start_paused = true)]
async fn test_reply_text_is_escaped_once() {
    let h = harness(
        RecordingTransport::default(),
        MockLlmClient::with_reply("I need water (a lot)! 100% sure."),
    );

    assert!(
        h.engine
            .handle_message(&InboundMessage::new("7", "Vendula: how are you?", None))
            .await
    );
    let (chat, text, mode) = h.transport.sent().remove(0);
    assert_eq!(chat, "7");
    assert_eq!(mode, ParseMode::MarkdownV2);
    assert_eq!(text, "🌱 *Vendula*: \nI need water \\(a lot\\)\\! 100% sure\\.");
}

#[tokio::test(start_paused = true)]
async fn test_cooldowns_are_independent_per_plant() {
    let h = harness(RecordingTransport::default(), MockLlmClient::with_reply("status"));
    let plants = demo_plants();

    assert!(h.engine.send_notification(&plants[0], "one", None).await);
    assert!(h.engine.send_notification(&plants[1], "two", None).await);
    assert!(!h.engine.send_notification(&plants[0], "three", None).await);

    tokio::time::advance(Duration::from_secs(299)).await;
    assert!(!h.engine.send_notification(&plants[1], "four", None).await);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(h.engine.send_notification(&plants[0], "five", None).await);
    assert!(h.engine.send_notification(&plants[1], "six", None).await);

    let chats: Vec<String> = h.transport.sent().into_iter().map(|(c, _, _)| c).collect();
    assert_eq!(chats, vec!["-100500"; 4]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_then_delivered() {
    let h = harness(
        RecordingTransport::scripted(vec![
            Err(TransportError::Timeout),
            Err(TransportError::RateLimited { retry_after_secs: None }),
        ]),
        MockLlmClient::with_reply("fine"),
    );

    let report = h
        .engine
        .delivery()
        .deliver_with_report(None, "hello", Some("Vendula"), Some(1))
        .await;
    assert_eq!(report.state, DeliveryState::Delivered);
    assert_eq!(report.attempts, 3);
    assert_eq!(h.transport.sent().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_round_uses_latest_sensor_context() {
    let h = harness(RecordingTransport::default(), MockLlmClient::with_reply("Water me"));
    h.sensors.record(SensorReading::new(1, 40.0, 21.5)).await;
    h.sensors.record(SensorReading::new(1, 35.0, 22.0)).await;
    h.sensors.record(SensorReading::new(2, 12.0, 26.0)).await;

    let results = h.engine.send_scheduled_notifications(None).await;
    assert!(results.values().all(|sent| *sent));
    assert_eq!(
        h.transport.texts(),
        vec![
            "🌱 *Vendula*: \nWater me".to_string(),
            "🌱 *Bobeš*: \nWater me".to_string(),
        ]
    );

    let prompts = h.llm.prompts();
    assert!(prompts[0][1].content.contains("moisture 35.0%"));
    assert!(prompts[0][1].content.contains("Your ideal moisture is 80."));
    assert!(prompts[1][1].content.contains("Your ideal moisture is 15."));
}

#[tokio::test(start_paused = true)]
async fn test_missing_default_chat_sends_nothing() {
    let transport = Arc::new(RecordingTransport::default());
    let engine = DispatchEngine::new(
        Arc::new(StaticRegistry::new(demo_plants())),
        Arc::new(PersonaGenerator::new(Arc::new(MockLlmClient::new()))),
        Arc::new(InMemorySensors::default()),
        DeliveryChannel::new(transport.clone(), None),
        ConversationStore::default(),
        CooldownTracker::default(),
    );

    assert!(!engine.send_notification(&demo_plants()[0], "hi", None).await);
    assert!(transport.sent().is_empty());
    assert!(engine.cooldowns().may_send(1).await);
}

#[tokio::test(start_paused = true)]
async fn test_posted_reading_enables_scheduled_notification() {
    let h = harness(RecordingTransport::default(), MockLlmClient::with_reply("Finally some data"));
    let router = create_sensor_router(Arc::new(SensorApiState {
        sensors: h.sensors.clone(),
        registry: Arc::new(StaticRegistry::new(demo_plants())),
    }));

    // 没有读数时不会发送
    let results = h.engine.send_scheduled_notifications(None).await;
    assert!(results.values().all(|sent| !*sent));
    assert!(h.transport.sent().is_empty());

    let response = router
        .oneshot(
            Request::post("/readings")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"plant_id": 1, "moisture": 42.0, "temperature": 23.5}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let results = h.engine.send_scheduled_notifications(None).await;
    assert_eq!(results.get(&1), Some(&true));
    assert_eq!(results.get(&2), Some(&false));
    assert_eq!(h.transport.texts(), vec!["🌱 *Vendula*: \nFinally some data".to_string()]);
    assert!(h.llm.prompts()[0][1].content.contains("moisture 42.0%"));
}

#[tokio::test(start_paused = true)]
async fn test_demo_readings_make_status_report_every_plant() {
    let h = harness(RecordingTransport::default(), MockLlmClient::with_reply("Doing fine"));
    for reading in demo_readings() {
        h.sensors.record(reading).await;
    }

    assert!(h.engine.handle_message(&InboundMessage::new("9", "/status", None)).await);
    assert_eq!(
        h.transport.texts(),
        vec![
            "Checking the status of all plants\\. Please wait\\.\\.\\.".to_string(),
            "🌱 *Vendula*: \nDoing fine".to_string(),
            "🌱 *Bobeš*: \nDoing fine".to_string(),
        ]
    );

    let results = h.engine.send_scheduled_notifications(None).await;
    // /status 成功后已进入冷却
    assert!(results.values().all(|sent| !*sent));
    tokio::time::advance(Duration::from_secs(300)).await;
    let results = h.engine.send_scheduled_notifications(None).await;
    assert!(results.values().all(|sent| *sent));
}
