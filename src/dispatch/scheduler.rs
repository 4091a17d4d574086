//! 定时通知循环
//!
//! 启动后立即执行一轮，之后每 interval 执行一次；关闭 token 触发后退出。
//! 单轮内的失败已在引擎内记录，不会中断循环。间隔为 0 时记录配置失败并直接返回。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::engine::DispatchEngine;
use crate::observability::{record_failure, FailureKind};

pub async fn run_scheduled_notifications(
    engine: Arc<DispatchEngine>,
    interval: Duration,
    chat_id: Option<String>,
    shutdown: CancellationToken,
) {
    if interval.is_zero() {
        record_failure(FailureKind::Config, None, None, &"scheduler interval must be greater than 0");
        return;
    }
    tracing::info!("Starting scheduled notifications every {} seconds", interval.as_secs());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Scheduled notifications stopped");
                break;
            }
            _ = ticker.tick() => {
                let results = engine.send_scheduled_notifications(chat_id.as_deref()).await;
                tracing::info!(
                    plants = results.len(),
                    "Scheduled notifications sent, next run in {} seconds",
                    interval.as_secs()
                );
            }
        }
    }
}
