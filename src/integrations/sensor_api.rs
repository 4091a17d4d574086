//! 传感器读数 HTTP 接口
//!
//! 采集脚本（湿度探头）通过 `POST /readings` 推送读数；
//! `GET /readings/:plant_id` 返回最新读数及湿度评估。

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observability::{record_failure, FailureKind};
use crate::plants::{evaluate_moisture, InMemorySensors, PlantRegistry, SensorReading, SensorSnapshotProvider};

/// 读数接口状态
pub struct SensorApiState {
    pub sensors: Arc<InMemorySensors>,
    pub registry: Arc<dyn PlantRegistry>,
}

/// POST /readings 请求体；timestamp 缺省为接收时间
#[derive(Debug, Deserialize)]
pub struct ReadingPayload {
    pub plant_id: i64,
    pub moisture: f64,
    pub temperature: f64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReadingPayload {
    fn validate(&self) -> Result<(), &'static str> {
        if !self.moisture.is_finite() || !(0.0..=100.0).contains(&self.moisture) {
            return Err("moisture must be a percentage between 0 and 100");
        }
        if !self.temperature.is_finite() {
            return Err("temperature must be a finite number");
        }
        Ok(())
    }

    fn into_reading(self) -> SensorReading {
        let reading = SensorReading::new(self.plant_id, self.moisture, self.temperature);
        match self.timestamp {
            Some(ts) => reading.at(ts),
            None => reading,
        }
    }
}

#[derive(Debug, Serialize)]
struct LatestReadingResponse {
    #[serde(flatten)]
    reading: SensorReading,
    level: &'static str,
    color: &'static str,
}

/// 创建读数接口路由
pub fn create_sensor_router(state: Arc<SensorApiState>) -> Router {
    Router::new()
        .route("/readings", post(ingest_reading))
        .route("/readings/:plant_id", get(latest_reading))
        .with_state(state)
}

/// POST /readings - 写入一条读数
async fn ingest_reading(
    State(state): State<Arc<SensorApiState>>,
    Json(payload): Json<ReadingPayload>,
) -> (StatusCode, String) {
    if let Err(reason) = payload.validate() {
        record_failure(FailureKind::Sensor, Some(payload.plant_id), None, &reason);
        return (StatusCode::UNPROCESSABLE_ENTITY, reason.to_string());
    }
    if state.registry.get_plant(payload.plant_id).await.is_none() {
        record_failure(FailureKind::Sensor, Some(payload.plant_id), None, &"unknown plant");
        return (
            StatusCode::NOT_FOUND,
            format!("unknown plant {}", payload.plant_id),
        );
    }

    let reading = payload.into_reading();
    tracing::info!(
        plant_id = reading.plant_id,
        "Recorded reading: moisture {:.1}%, temperature {:.1}°C",
        reading.moisture,
        reading.temperature
    );
    state.sensors.record(reading).await;
    (StatusCode::CREATED, "recorded".to_string())
}

/// GET /readings/:plant_id - 最新读数与湿度档位
async fn latest_reading(
    State(state): State<Arc<SensorApiState>>,
    Path(plant_id): Path<i64>,
) -> Result<Json<LatestReadingResponse>, StatusCode> {
    let plant = state
        .registry
        .get_plant(plant_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    let reading = state
        .sensors
        .latest_reading(plant_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    let level = evaluate_moisture(plant.moisture_threshold, reading.moisture);
    Ok(Json(LatestReadingResponse {
        reading,
        level: level.label(),
        color: level.color(),
    }))
}
