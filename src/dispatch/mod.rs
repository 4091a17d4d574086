//! 会话与通知分发
//!
//! - **normalize** / **markup**: 名称匹配规范化、MarkdownV2 转义
//! - **cooldown**: 每株植物的通知冷却
//! - **resolver**: 入站文本 → 植物
//! - **delivery**: 有限重试的出站投递
//! - **engine**: 把以上组件与生成器、登记表、传感器串起来
//! - **commands** / **scheduler**: 斜杠命令与定时通知循环

pub mod commands;
pub mod cooldown;
pub mod delivery;
pub mod engine;
pub mod markup;
pub mod normalize;
pub mod resolver;
pub mod scheduler;

pub use commands::Command;
pub use cooldown::CooldownTracker;
pub use delivery::{
    DeliveryChannel, DeliveryReport, DeliveryState, ParseMode, Transport, TransportError,
};
pub use engine::{DispatchEngine, InboundMessage};
pub use markup::escape;
pub use normalize::normalize;
pub use resolver::{resolve, strip_address};
pub use scheduler::run_scheduled_notifications;
