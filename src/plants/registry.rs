//! 植物登记表
//!
//! 分发引擎只读取植物列表；登记表自身的失败（网络 / 数据库）应在实现内部吞掉并返回空列表。

use async_trait::async_trait;

use super::Plant;

/// 植物登记表接口
#[async_trait]
pub trait PlantRegistry: Send + Sync {
    /// 列出所有植物；失败时返回空列表而不是错误
    async fn list_plants(&self) -> Vec<Plant>;

    async fn get_plant(&self, id: i64) -> Option<Plant> {
        self.list_plants().await.into_iter().find(|p| p.id == id)
    }
}

/// 内存登记表：来自配置文件的 [[plants]]
pub struct StaticRegistry {
    plants: Vec<Plant>,
}

impl StaticRegistry {
    pub fn new(plants: Vec<Plant>) -> Self {
        Self { plants }
    }

    /// 配置为空时回落到演示植物
    pub fn from_config(plants: &[Plant]) -> Self {
        if plants.is_empty() {
            tracing::info!("No plants configured, registering demo plants");
            Self::new(demo_plants())
        } else {
            Self::new(plants.to_vec())
        }
    }
}

#[async_trait]
impl PlantRegistry for StaticRegistry {
    async fn list_plants(&self) -> Vec<Plant> {
        self.plants.clone()
    }
}

/// 两株演示植物：Vendula（捕蝇草）与 Bobeš（仙人掌）
pub fn demo_plants() -> Vec<Plant> {
    vec![
        Plant::new(
            1,
            "Vendula",
            "Venus flytrap",
            "teenage girl full of hormones",
            "very dramatic, sarcastic, emotional, and hilarious",
        )
        .with_location("living room")
        .with_moisture_threshold(80),
        Plant::new(
            2,
            "Bobeš",
            "Cactus",
            "old grumpy grandpa",
            "very grumpy, flegmatic, sarcastic and funny",
        )
        .with_location("bedroom")
        .with_moisture_threshold(15),
    ]
}
