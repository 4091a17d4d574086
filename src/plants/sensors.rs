//! 传感器快照提供方
//!
//! 读数由外部采集脚本通过 HTTP 接口写入；这里定义读取接口、内存实现和演示读数。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SensorReading;

#[async_trait]
pub trait SensorSnapshotProvider: Send + Sync {
    /// 最新一条读数
    async fn latest_reading(&self, plant_id: i64) -> Option<SensorReading>;

    /// 最近 limit 条读数（时间升序）
    async fn recent_readings(&self, plant_id: i64, limit: usize) -> Vec<SensorReading> {
        self.latest_reading(plant_id)
            .await
            .into_iter()
            .take(limit)
            .collect()
    }
}

/// 内存读数存储：每株植物最多保留 capacity 条
pub struct InMemorySensors {
    readings: RwLock<HashMap<i64, Vec<SensorReading>>>,
    capacity: usize,
}

impl InMemorySensors {
    pub fn new(capacity: usize) -> Self {
        Self {
            readings: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// 写入一条读数，超出容量时丢弃最旧的
    pub async fn record(&self, reading: SensorReading) {
        let mut readings = self.readings.write().await;
        let series = readings.entry(reading.plant_id).or_default();
        series.push(reading);
        series.sort_by_key(|r| r.timestamp);
        if series.len() > self.capacity {
            let excess = series.len() - self.capacity;
            series.drain(..excess);
        }
    }
}

/// 演示植物的初始读数（Vendula 湿度适宜，Bobeš 偏干）
pub fn demo_readings() -> Vec<SensorReading> {
    vec![
        SensorReading::new(1, 75.5, 22.3),
        SensorReading::new(2, 10.2, 25.7),
    ]
}

impl Default for InMemorySensors {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl SensorSnapshotProvider for InMemorySensors {
    async fn latest_reading(&self, plant_id: i64) -> Option<SensorReading> {
        self.readings
            .read()
            .await
            .get(&plant_id)
            .and_then(|s| s.last().cloned())
    }

    async fn recent_readings(&self, plant_id: i64, limit: usize) -> Vec<SensorReading> {
        self.readings
            .read()
            .await
            .get(&plant_id)
            .map(|s| s[s.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default()
    }
}
