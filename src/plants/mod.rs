//! 植物领域：模型、登记表、传感器快照、湿度评估

pub mod model;
pub mod moisture;
pub mod registry;
pub mod sensors;

pub use model::{Plant, SensorData, SensorReading};
pub use moisture::{evaluate_moisture, MoistureLevel};
pub use registry::{demo_plants, PlantRegistry, StaticRegistry};
pub use sensors::{demo_readings, InMemorySensors, SensorSnapshotProvider};
