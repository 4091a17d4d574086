//! 分发引擎：把冷却、对话历史、名称解析、消息生成与投递串起来
//!
//! - 出站通知：冷却检查 → 传感器快照 → 生成 → 投递 → 成功后 mark_sent
//! - 入站消息：命令 / 名称解析 → 读历史 → 生成回复 → 写历史 → 投递
//!
//! 所有协作方的失败都在这里被捕获并记录为结构化失败事件；公开方法只返回 bool 或结果表。

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::MessageGenerator;
use crate::memory::ConversationStore;
use crate::observability::{record_failure, FailureKind};
use crate::plants::{evaluate_moisture, Plant, PlantRegistry, SensorData, SensorSnapshotProvider};

use super::commands::{Command, HELP_TEXT, NO_PLANTS_TEXT, START_TEXT};
use super::cooldown::CooldownTracker;
use super::delivery::{DeliveryChannel, Transport};
use super::resolver::{resolve, strip_address};

/// 对话回复时带给生成器的最近读数条数
const REPLY_SENSOR_WINDOW: usize = 10;

/// 来自群聊的一条文本消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: String,
    pub text: String,
    /// 发送者名字（Telegram first_name）
    pub sender: Option<String>,
}

impl InboundMessage {
    pub fn new(chat_id: impl Into<String>, text: impl Into<String>, sender: Option<&str>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
            sender: sender.map(String::from),
        }
    }
}

pub struct DispatchEngine {
    registry: Arc<dyn PlantRegistry>,
    generator: Arc<dyn MessageGenerator>,
    sensors: Arc<dyn SensorSnapshotProvider>,
    delivery: DeliveryChannel,
    conversations: ConversationStore,
    cooldowns: CooldownTracker,
}

impl DispatchEngine {
    /// 由调用方注入存储与投递通道
    pub fn new(
        registry: Arc<dyn PlantRegistry>,
        generator: Arc<dyn MessageGenerator>,
        sensors: Arc<dyn SensorSnapshotProvider>,
        delivery: DeliveryChannel,
        conversations: ConversationStore,
        cooldowns: CooldownTracker,
    ) -> Self {
        Self {
            registry,
            generator,
            sensors,
            delivery,
            conversations,
            cooldowns,
        }
    }

    /// 按配置构造存储与投递通道
    pub fn from_config(
        config: &AppConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<dyn PlantRegistry>,
        generator: Arc<dyn MessageGenerator>,
        sensors: Arc<dyn SensorSnapshotProvider>,
    ) -> Self {
        let delivery = DeliveryChannel::from_config(
            transport,
            config.telegram.resolve_default_chat(),
            &config.delivery,
        );
        Self::new(
            registry,
            generator,
            sensors,
            delivery,
            ConversationStore::new(config.conversation.max_history, config.conversation.expiry()),
            CooldownTracker::new(config.cooldown.period()),
        )
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    pub fn delivery(&self) -> &DeliveryChannel {
        &self.delivery
    }

    /// 发送一条已生成的通知：冷却中返回 false；投递成功后才更新冷却
    pub async fn send_notification(&self, plant: &Plant, text: &str, chat_id: Option<&str>) -> bool {
        if !self.cooldowns.may_send(plant.id).await {
            tracing::info!(plant_id = plant.id, "Skipping notification for {} due to rate limiting", plant.name);
            return false;
        }
        self.deliver_notification(plant, text, chat_id).await
    }

    async fn deliver_notification(&self, plant: &Plant, text: &str, chat_id: Option<&str>) -> bool {
        let report = self
            .delivery
            .deliver_with_report(chat_id, text, Some(&plant.name), Some(plant.id))
            .await;
        if report.delivered() {
            self.cooldowns.mark_sent(plant.id).await;
        } else {
            tracing::warn!(
                plant_id = plant.id,
                attempts = report.attempts,
                "Notification for {} not delivered, cooldown left untouched",
                plant.name
            );
        }
        report.delivered()
    }

    /// 生成并发送一株植物的状态通知（受冷却限制，冷却只在开头检查一次）
    pub async fn notify_plant(&self, plant: &Plant, chat_id: Option<&str>) -> bool {
        if let Some(remaining) = self.cooldowns.remaining(plant.id).await {
            tracing::info!(
                plant_id = plant.id,
                "Skipping notification for {} due to rate limiting ({}s left)",
                plant.name,
                remaining.as_secs()
            );
            return false;
        }

        let Some(data) = self.latest_snapshot(plant).await else {
            record_failure(FailureKind::Sensor, Some(plant.id), None, &"no sensor data available");
            return false;
        };

        match self.generator.generate_notification(plant, Some(&data)).await {
            Ok(text) => self.deliver_notification(plant, &text, chat_id).await,
            Err(e) => {
                record_failure(FailureKind::Generation, Some(plant.id), None, &e);
                false
            }
        }
    }

    /// 对登记表中每株植物执行 notify_plant，返回 plant_id -> 是否发送成功
    pub async fn send_scheduled_notifications(&self, chat_id: Option<&str>) -> BTreeMap<i64, bool> {
        let plants = self.registry.list_plants().await;
        if plants.is_empty() {
            record_failure(FailureKind::Registry, None, None, &"registry returned no plants");
        }

        let mut results = BTreeMap::new();
        for plant in &plants {
            let sent = self.notify_plant(plant, chat_id).await;
            results.insert(plant.id, sent);
        }

        let sent = results.values().filter(|ok| **ok).count();
        tracing::info!("Scheduled notifications: {}/{} sent", sent, results.len());
        results
    }

    /// 处理一条入站消息；返回最终回复是否送达
    pub async fn handle_message(&self, msg: &InboundMessage) -> bool {
        if let Some(cmd) = Command::parse(&msg.text) {
            return self.handle_command(&msg.chat_id, cmd).await;
        }

        let plants = self.registry.list_plants().await;
        if plants.is_empty() {
            return self
                .reply(&msg.chat_id, "Sorry, I don't have any plants registered to chat with you.")
                .await;
        }

        let Some(plant) = resolve(&msg.text, &plants) else {
            let names: Vec<&str> = plants.iter().map(|p| p.name.as_str()).collect();
            let prompt = format!(
                "I'm not sure which plant you mean. Mention one of them by name, e.g. '{}, how are you?'. Plants: {}",
                names[0],
                names.join(", ")
            );
            return self.reply(&msg.chat_id, &prompt).await;
        };

        let mut user_text = strip_address(&msg.text, plant);
        if user_text.is_empty() {
            user_text = msg.text.trim().to_string();
        }
        let sender = msg.sender.as_deref();
        tracing::info!(
            plant_id = plant.id,
            "Message from {} to {}: {}",
            sender.unwrap_or("unknown"),
            plant.name,
            user_text
        );

        let history = self.conversations.get_history(plant.id).await;
        self.conversations
            .append(plant.id, format!("{}: {}", sender.unwrap_or("User"), user_text))
            .await;

        let data = self.recent_snapshot(plant).await;
        match self
            .generator
            .generate_reply(plant, &user_text, &history, sender, data.as_ref())
            .await
        {
            Ok(response) => {
                self.conversations
                    .append(plant.id, format!("{}: {}", plant.name, response))
                    .await;
                self.delivery
                    .deliver_with_report(Some(&msg.chat_id), &response, Some(&plant.name), Some(plant.id))
                    .await
                    .delivered()
            }
            Err(e) => {
                record_failure(FailureKind::Generation, Some(plant.id), None, &e);
                let apology = format!("Sorry, {} is having trouble communicating right now.", plant.name);
                self.reply(&msg.chat_id, &apology).await
            }
        }
    }

    async fn handle_command(&self, chat_id: &str, cmd: Command) -> bool {
        tracing::info!("Command {:?} in chat {}", cmd, chat_id);
        match cmd {
            Command::Start => self.reply(chat_id, START_TEXT).await,
            Command::Help | Command::Unknown(_) => self.reply(chat_id, HELP_TEXT).await,
            Command::Plants => {
                let plants = self.registry.list_plants().await;
                if plants.is_empty() {
                    return self.reply(chat_id, NO_PLANTS_TEXT).await;
                }
                let mut text = String::from("Available plants:\n");
                for plant in &plants {
                    let _ = writeln!(text, "- {} ({}) - {}", plant.name, plant.species, plant.persona);
                }
                self.reply(chat_id, text.trim_end()).await
            }
            Command::Status => self.status(chat_id).await,
            Command::Summary => self.summary(chat_id).await,
            Command::Care => self.care(chat_id).await,
        }
    }

    /// 用户主动请求：每株植物立即生成通知发到当前群聊，不检查冷却，但成功后同样更新冷却
    async fn status(&self, chat_id: &str) -> bool {
        let plants = self.registry.list_plants().await;
        if plants.is_empty() {
            return self.reply(chat_id, NO_PLANTS_TEXT).await;
        }
        self.reply(chat_id, "Checking the status of all plants. Please wait...")
            .await;

        let mut all_sent = true;
        for plant in &plants {
            let sent = match self.latest_snapshot(plant).await {
                Some(data) => match self.generator.generate_notification(plant, Some(&data)).await {
                    Ok(text) => self.deliver_notification(plant, &text, Some(chat_id)).await,
                    Err(e) => {
                        record_failure(FailureKind::Generation, Some(plant.id), None, &e);
                        let apology =
                            format!("Sorry, {} is having trouble communicating right now.", plant.name);
                        self.reply(chat_id, &apology).await;
                        false
                    }
                },
                None => {
                    self.reply(chat_id, &format!("No sensor data available for {}", plant.name))
                        .await;
                    false
                }
            };
            all_sent &= sent;
        }
        all_sent
    }

    /// 每株植物一行：一句话总结 + 当前湿度评估
    async fn summary(&self, chat_id: &str) -> bool {
        let plants = self.registry.list_plants().await;
        if plants.is_empty() {
            return self.reply(chat_id, NO_PLANTS_TEXT).await;
        }

        let mut text = String::new();
        for plant in &plants {
            let Some(data) = self.latest_snapshot(plant).await else {
                let _ = writeln!(text, "{}: no sensor data yet", plant.name);
                continue;
            };
            let line = match self.generator.generate_summary(plant, Some(&data)).await {
                Ok(summary) => summary,
                Err(e) => {
                    record_failure(FailureKind::Generation, Some(plant.id), None, &e);
                    "...".to_string()
                }
            };
            match data.latest() {
                Some(reading) => {
                    let level = evaluate_moisture(plant.moisture_threshold, reading.moisture);
                    let _ = writeln!(
                        text,
                        "{}: {} ({:.0}% moisture, {})",
                        plant.name,
                        line,
                        reading.moisture,
                        level.label()
                    );
                }
                None => {
                    let _ = writeln!(text, "{}: {}", plant.name, line);
                }
            }
        }
        self.reply(chat_id, text.trim_end()).await
    }

    /// 每株植物一条照料建议，合并为一条消息
    async fn care(&self, chat_id: &str) -> bool {
        let plants = self.registry.list_plants().await;
        if plants.is_empty() {
            return self.reply(chat_id, NO_PLANTS_TEXT).await;
        }

        let mut text = String::from("Care tips:\n");
        for plant in &plants {
            let Some(data) = self.latest_snapshot(plant).await else {
                let _ = writeln!(text, "{}: no sensor data yet", plant.name);
                continue;
            };
            match self.generator.generate_recommendation(plant, Some(&data)).await {
                Ok(tip) => {
                    let _ = writeln!(text, "{}: {}", plant.name, tip);
                }
                Err(e) => {
                    record_failure(FailureKind::Generation, Some(plant.id), None, &e);
                    let _ = writeln!(text, "{}: is having trouble communicating right now", plant.name);
                }
            }
        }
        self.reply(chat_id, text.trim_end()).await
    }

    async fn latest_snapshot(&self, plant: &Plant) -> Option<SensorData> {
        self.sensors
            .latest_reading(plant.id)
            .await
            .map(SensorData::LatestReading)
    }

    async fn recent_snapshot(&self, plant: &Plant) -> Option<SensorData> {
        let readings = self.sensors.recent_readings(plant.id, REPLY_SENSOR_WINDOW).await;
        SensorData::from_readings(readings)
    }

    /// 机器人自身的回复（无植物前缀）
    async fn reply(&self, chat_id: &str, text: &str) -> bool {
        self.delivery.deliver(Some(chat_id), text, None).await
    }
}
