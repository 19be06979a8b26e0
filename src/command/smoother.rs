//! 时间平滑 (Temporal smoothing)
//!
//! 简单低通: 历史不少于3条时,非零分量统一乘以平滑系数,零分量保持为零;
//! 历史不足时原样通过。这是经验做法,不是控制理论意义上的滤波器,系数待标定。

use serde::{Deserialize, Serialize};

use super::intent::Intent;
use crate::detection::TrackingHistory;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub factor: f32,         // 平滑系数
    pub min_history: usize,  // 启用平滑所需的最少历史条数
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            factor: 0.7,
            min_history: 3,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TemporalSmoother {
    config: SmoothingConfig,
}

impl TemporalSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        Self { config }
    }

    pub fn smooth(&self, intent: Intent, history: &TrackingHistory) -> Intent {
        if history.len() < self.config.min_history {
            return intent;
        }
        let factor = self.config.factor;
        intent.map(|v| if v != 0.0 { v * factor } else { 0.0 })
    }
}
