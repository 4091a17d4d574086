//! 植物人设消息生成
//!
//! 由植物的 species / persona / personality 组成系统提示词，附上传感器上下文，
//! 按任务（每日通知、一句话总结、照料建议、对话回复）拼出提示词交给 LlmClient。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::BotError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::plants::{Plant, SensorData};

/// 通知最多字数
pub const RESPONSE_MAX_WORDS: usize = 60;

/// 未提供发送者名字时对话中使用的称呼
pub const DEFAULT_CAREGIVERS: &str = "Vítězslav and Martina";

/// 文本生成协作方；任何方法都可能失败，由分发引擎兜底
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    async fn generate_notification(
        &self,
        plant: &Plant,
        data: Option<&SensorData>,
    ) -> Result<String, BotError>;

    async fn generate_reply(
        &self,
        plant: &Plant,
        user_text: &str,
        history: &[String],
        sender: Option<&str>,
        data: Option<&SensorData>,
    ) -> Result<String, BotError>;

    /// 一句话状态（不超过 12 个词）
    async fn generate_summary(
        &self,
        plant: &Plant,
        data: Option<&SensorData>,
    ) -> Result<String, BotError>;

    /// 给照料者的下一步建议（不超过 20 个词）
    async fn generate_recommendation(
        &self,
        plant: &Plant,
        data: Option<&SensorData>,
    ) -> Result<String, BotError>;
}

/// 基于 LLM 的人设生成器
pub struct PersonaGenerator {
    llm: Arc<dyn LlmClient>,
}

impl PersonaGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn personality_prompt(plant: &Plant) -> String {
        format!(
            "You are a plant ({}) that lives in a flat with Martina and Vítězslav. \
             They are supposed to take care of you like parents would do. \
             You live in the {}. You have a persona of {}. Be {} when responding.",
            plant.species, plant.location, plant.persona, plant.personality
        )
    }

    /// 系统人设 + 传感器上下文（有数据时）
    fn base_messages(plant: &Plant, data: Option<&SensorData>) -> Vec<Message> {
        let mut messages = vec![Message::system(Self::personality_prompt(plant))];
        if let Some(data) = data {
            messages.push(Message::system(
                data.to_context(Some(plant.moisture_threshold)),
            ));
        }
        messages
    }

    async fn run(&self, plant: &Plant, messages: Vec<Message>) -> Result<String, BotError> {
        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| BotError::generation(format!("{} could not generate: {}", plant.name, e)))?;
        Ok(reply.trim().to_string())
    }
}

#[async_trait]
impl MessageGenerator for PersonaGenerator {
    async fn generate_notification(
        &self,
        plant: &Plant,
        data: Option<&SensorData>,
    ) -> Result<String, BotError> {
        let mut messages = Self::base_messages(plant, data);
        messages.push(Message::user(format!(
            "Based on this data, provide summary about how you are doing. \
             Keep your answer concise (max {} words).",
            RESPONSE_MAX_WORDS
        )));
        self.run(plant, messages).await
    }

    async fn generate_reply(
        &self,
        plant: &Plant,
        user_text: &str,
        history: &[String],
        sender: Option<&str>,
        data: Option<&SensorData>,
    ) -> Result<String, BotError> {
        let mut messages = Self::base_messages(plant, data);
        if !history.is_empty() {
            messages.push(Message::system(history.join("\n")));
        }
        let sender = sender
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_CAREGIVERS);
        messages.push(Message::user(format!("{}: {}", sender, user_text)));
        self.run(plant, messages).await
    }

    async fn generate_summary(
        &self,
        plant: &Plant,
        data: Option<&SensorData>,
    ) -> Result<String, BotError> {
        let mut messages = Self::base_messages(plant, data);
        messages.push(Message::user(
            "Give one sentence summary on how you feel (max 12 words).",
        ));
        self.run(plant, messages).await
    }

    async fn generate_recommendation(
        &self,
        plant: &Plant,
        data: Option<&SensorData>,
    ) -> Result<String, BotError> {
        let mut messages = Self::base_messages(plant, data);
        messages.push(Message::user(
            "Give Vítězslav and Martina short (max 20 words) recommendation \
             on next steps to take care of you.",
        ));
        self.run(plant, messages).await
    }
}
