//! 湿度评估：按植物理想湿度划分五档

/// 湿度档位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoistureLevel {
    DangerDry,
    Dry,
    Optimal,
    Wet,
    Waterlogged,
}

impl MoistureLevel {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DangerDry => "😱 SOS! Dangerously dry - needs immediate watering!",
            Self::Dry => "🤔 Warning: Getting dry - consider watering soon",
            Self::Optimal => "🥳 Optimal moisture level - perfect hydration!",
            Self::Wet => "😬 Warning: Too wet - reduce watering",
            Self::Waterlogged => "🆘 Danger: Waterlogged - check drainage immediately!",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Self::DangerDry | Self::Waterlogged => "red",
            Self::Dry | Self::Wet => "orange",
            Self::Optimal => "green",
        }
    }
}

/// 阈值 t：< 0.6t 危险干燥，< 0.8t 偏干，<= 1.2t 适宜，<= 1.4t 偏湿，其余为积水
pub fn evaluate_moisture(threshold: u32, moisture: f64) -> MoistureLevel {
    let t = f64::from(threshold);
    if moisture < t * 0.6 {
        MoistureLevel::DangerDry
    } else if moisture < t * 0.8 {
        MoistureLevel::Dry
    } else if moisture <= t * 1.2 {
        MoistureLevel::Optimal
    } else if moisture <= t * 1.4 {
        MoistureLevel::Wet
    } else {
        MoistureLevel::Waterlogged
    }
}
