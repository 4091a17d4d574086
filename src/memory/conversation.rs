//! 短期记忆：每株植物的对话历史
//!
//! - `Message` / `Role`：发给 LLM 的消息
//! - `ConversationStore`：按植物 ID 保存最近 max_history 行对话，超过 expiry 未活跃则在下一次读取时清空

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 单株植物的对话记录
#[derive(Debug)]
struct ConversationRecord {
    messages: VecDeque<String>,
    last_active: Instant,
}

impl ConversationRecord {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            last_active: Instant::now(),
        }
    }
}

/// 对话存储：plant_id -> 最近 N 行
pub struct ConversationStore {
    records: Mutex<HashMap<i64, ConversationRecord>>,
    max_history: usize,
    expiry: Duration,
}

impl ConversationStore {
    pub fn new(max_history: usize, expiry: Duration) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            max_history,
            expiry,
        }
    }

    /// 追加到末尾并刷新 last_active；超出上限时从头部（最旧）丢弃
    pub async fn append(&self, plant_id: i64, message: impl Into<String>) {
        let mut records = self.records.lock().await;
        let record = records.entry(plant_id).or_insert_with(ConversationRecord::new);
        record.last_active = Instant::now();
        record.messages.push_back(message.into());
        while record.messages.len() > self.max_history {
            record.messages.pop_front();
        }
    }

    /// 读取历史（旧 → 新）。超过 expiry 未活跃时先清空并把 last_active 置为现在。
    pub async fn get_history(&self, plant_id: i64) -> Vec<String> {
        let mut records = self.records.lock().await;
        let record = records.entry(plant_id).or_insert_with(ConversationRecord::new);
        if record.last_active.elapsed() > self.expiry {
            tracing::debug!(plant_id, "Conversation expired, clearing history");
            record.messages.clear();
            record.last_active = Instant::now();
        }
        record.messages.iter().cloned().collect()
    }

    /// 当前保存的行数（不触发过期检查）
    pub async fn len(&self, plant_id: i64) -> usize {
        self.records
            .lock()
            .await
            .get(&plant_id)
            .map_or(0, |r| r.messages.len())
    }

    pub async fn is_empty(&self, plant_id: i64) -> bool {
        self.len(plant_id).await == 0
    }

    pub async fn clear(&self, plant_id: i64) {
        if let Some(record) = self.records.lock().await.get_mut(&plant_id) {
            record.messages.clear();
        }
    }

    #[cfg(test)]
    async fn last_active(&self, plant_id: i64) -> Option<Instant> {
        self.records.lock().await.get(&plant_id).map(|r| r.last_active)
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(10, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_unknown_plant_has_empty_history() {
        let store = ConversationStore::default();
        assert!(store.get_history(42).await.is_empty());
        assert!(store.is_empty(42).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_fifo_eviction() {
        let store = ConversationStore::new(10, Duration::from_secs(3600));
        for i in 0..25 {
            store.append(1, format!("msg {}", i)).await;
        }
        let history = store.get_history(1).await;
        let expected: Vec<String> = (15..25).map(|i| format!("msg {}", i)).collect();
        assert_eq!(history, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_clears_on_read_and_resets_last_active() {
        let store = ConversationStore::new(10, Duration::from_secs(3600));
        store.append(1, "User: hi").await;
        store.append(1, "Vendula: hello").await;

        tokio::time::advance(Duration::from_secs(3600)).await;
        // 恰好等于 expiry 不过期
        assert_eq!(store.get_history(1).await.len(), 2);

        tokio::time::advance(Duration::from_secs(3601)).await;
        assert!(store.get_history(1).await.is_empty());
        assert_eq!(store.last_active(1).await, Some(Instant::now()));

        store.append(1, "User: again").await;
        assert_eq!(store.get_history(1).await, vec!["User: again".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_does_not_refresh_activity() {
        let store = ConversationStore::new(10, Duration::from_secs(100));
        store.append(1, "a").await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(store.get_history(1).await.len(), 1);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(store.get_history(1).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_plants_are_isolated() {
        let store = ConversationStore::default();
        store.append(1, "one").await;
        store.append(2, "two").await;
        store.clear(1).await;
        assert!(store.get_history(1).await.is_empty());
        assert_eq!(store.get_history(2).await, vec!["two".to_string()]);
    }
}
