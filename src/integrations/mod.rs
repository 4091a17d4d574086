//! 外部集成：Telegram（长轮询或 Webhook）与传感器读数 HTTP 接口

pub mod sensor_api;
pub mod telegram;
