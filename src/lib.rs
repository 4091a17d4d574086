//! Plantbot - 植物群聊机器人的会话与通知分发引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、优雅关闭
//! - **dispatch**: 文本规范化、MarkdownV2 转义、冷却、名称解析、投递与分发引擎
//! - **integrations**: Telegram 传输（长轮询 / Webhook）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）及植物人设生成器
//! - **memory**: 每株植物的短期对话历史
//! - **observability**: 日志初始化与结构化失败事件
//! - **plants**: 植物登记表、传感器快照与湿度评估

pub mod config;
pub mod core;
pub mod dispatch;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plants;

pub use crate::core::BotError;
pub use dispatch::{DispatchEngine, InboundMessage};
