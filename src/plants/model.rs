//! 植物与传感器数据模型
//!
//! Plant 是只读身份（由外部登记表提供）；SensorData 是「最新读数 / 历史序列」的标签联合，
//! 在边界处一次性确定形状，再交给生成器渲染为提示词上下文。

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 被监控的植物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: i64,
    pub name: String,
    pub species: String,
    /// 人设，如 "old grumpy grandpa"
    pub persona: String,
    /// 说话风格，如 "very grumpy, flegmatic, sarcastic and funny"
    pub personality: String,
    #[serde(default = "default_location")]
    pub location: String,
    /// 理想湿度（百分比）
    #[serde(default = "default_moisture_threshold")]
    pub moisture_threshold: u32,
}

fn default_location() -> String {
    "living room".to_string()
}

fn default_moisture_threshold() -> u32 {
    50
}

impl Plant {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        species: impl Into<String>,
        persona: impl Into<String>,
        personality: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            species: species.into(),
            persona: persona.into(),
            personality: personality.into(),
            location: default_location(),
            moisture_threshold: default_moisture_threshold(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_moisture_threshold(mut self, threshold: u32) -> Self {
        self.moisture_threshold = threshold;
        self
    }
}

/// 单条传感器读数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub plant_id: i64,
    /// 湿度百分比
    pub moisture: f64,
    /// 摄氏度
    pub temperature: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    pub fn new(plant_id: i64, moisture: f64, temperature: f64) -> Self {
        Self {
            plant_id,
            moisture,
            temperature,
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn render(&self) -> String {
        format!(
            "{} | moisture {:.1}% | temperature {:.1}°C",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.moisture,
            self.temperature
        )
    }
}

/// 生成器需要的传感器数据形状
#[derive(Debug, Clone, PartialEq)]
pub enum SensorData {
    LatestReading(SensorReading),
    /// 按时间升序
    HistoricalSeries(Vec<SensorReading>),
}

impl SensorData {
    /// 从一组读数构造；空序列返回 None，单条退化为 LatestReading
    pub fn from_readings(mut readings: Vec<SensorReading>) -> Option<Self> {
        match readings.len() {
            0 => None,
            1 => readings.pop().map(Self::LatestReading),
            _ => {
                readings.sort_by_key(|r| r.timestamp);
                Some(Self::HistoricalSeries(readings))
            }
        }
    }

    /// 最近的一条读数
    pub fn latest(&self) -> Option<&SensorReading> {
        match self {
            Self::LatestReading(r) => Some(r),
            Self::HistoricalSeries(series) => series.last(),
        }
    }

    pub fn readings(&self) -> Vec<&SensorReading> {
        match self {
            Self::LatestReading(r) => vec![r],
            Self::HistoricalSeries(series) => series.iter().collect(),
        }
    }

    /// 渲染为提示词中的传感器上下文
    pub fn to_context(&self, moisture_threshold: Option<u32>) -> String {
        let mut out = String::from("Here is most recent sensor data on how you are doing:\n");
        for reading in self.readings() {
            let _ = writeln!(out, "- {}", reading.render());
        }
        out.push_str("\nLegend:\n- Moisture in percentage\n- Temperature is in Celsius.\n");
        if let Some(threshold) = moisture_threshold {
            let _ = write!(out, "\nYour ideal moisture is {}.", threshold);
        }
        out
    }
}
