//! 通知冷却：每株植物两次成功通知之间至少间隔 COOLDOWN
//!
//! 只有投递成功后才调用 mark_sent；失败的投递不重置冷却，下一轮调度会立即重试。

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct CooldownTracker {
    /// plant_id -> 上次成功发送时间；缺省视为从未发送
    last_sent: Mutex<HashMap<i64, Instant>>,
    period: Duration,
}

impl CooldownTracker {
    pub fn new(period: Duration) -> Self {
        Self {
            last_sent: Mutex::new(HashMap::new()),
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// now - last_sent >= period；从未发送过的植物总是允许
    pub async fn may_send(&self, plant_id: i64) -> bool {
        match self.last_sent.lock().await.get(&plant_id) {
            Some(last) => last.elapsed() >= self.period,
            None => true,
        }
    }

    pub async fn mark_sent(&self, plant_id: i64) {
        self.last_sent.lock().await.insert(plant_id, Instant::now());
    }

    /// 距离冷却结束还剩多久；可发送时返回 None
    pub async fn remaining(&self, plant_id: i64) -> Option<Duration> {
        let last_sent = self.last_sent.lock().await;
        let elapsed = last_sent.get(&plant_id)?.elapsed();
        self.period.checked_sub(elapsed).filter(|d| !d.is_zero())
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_send_always_allowed() {
        let tracker = CooldownTracker::default();
        assert!(tracker.may_send(1).await);
        assert!(tracker.remaining(1).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_until_period_elapsed() {
        let tracker = CooldownTracker::new(Duration::from_secs(300));
        tracker.mark_sent(1).await;
        assert!(!tracker.may_send(1).await);
        assert_eq!(tracker.remaining(1).await, Some(Duration::from_secs(300)));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!tracker.may_send(1).await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(tracker.may_send(1).await);
        assert!(tracker.remaining(1).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entities_are_independent() {
        let tracker = CooldownTracker::default();
        tracker.mark_sent(1).await;
        assert!(!tracker.may_send(1).await);
        assert!(tracker.may_send(2).await);
    }
}
