//! 目标选择 (Target selection)
//! 对同一帧的多个检测框打分,每周期最多选出一个跟踪目标
//!
//! 评分 = 中心分 + 置信度×100 + 尺寸分
//! - 中心分: max(0, 100 - 距画面中心像素距离/10)
//! - 尺寸分: 最大边长在 [min_size, max_size] 内得50分,否则 max(0, 50 - |边长-标称尺寸|/10)
//!
//! 纯函数: 无副作用、无随机性,与相机/模型无关

use serde::{Deserialize, Serialize};

use super::types::{Detection, FrameSize, Target};

/// 目标选择参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub min_person_size: f32, // 最小可跟踪像素尺寸
    pub max_person_size: f32, // 最大像素尺寸 (太近)
    pub nominal_size: f32,    // 标称目标尺寸
    pub min_confidence: f32,  // 检测置信度下限
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_person_size: 50.0,
            max_person_size: 400.0,
            nominal_size: 200.0,
            min_confidence: 0.5,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TargetSelector {
    config: SelectionConfig,
}

impl TargetSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// 单个检测框的评分
    pub fn score(&self, detection: &Detection, frame: FrameSize) -> f32 {
        let (cx, cy) = detection.center();
        let (frame_cx, frame_cy) = frame.center();

        // 越靠近画面中心越好
        let distance = ((cx - frame_cx).powi(2) + (cy - frame_cy).powi(2)).sqrt();
        let center_score = (100.0 - distance / 10.0).max(0.0);

        // 置信度越高越好
        let confidence_score = detection.confidence() * 100.0;

        // 尺寸适中 (不太近也不太远)
        let extent = detection.extent();
        let size_score = if self.config.min_person_size <= extent
            && extent <= self.config.max_person_size
        {
            50.0
        } else {
            (50.0 - (extent - self.config.nominal_size).abs() / 10.0).max(0.0)
        };

        center_score + confidence_score + size_score
    }

    /// 选出得分最高的检测框; 同分时取最先出现者
    pub fn select(&self, detections: &[Detection], frame: FrameSize) -> Option<Target> {
        let mut best: Option<Target> = None;

        for detection in detections {
            if detection.confidence() < self.config.min_confidence {
                continue;
            }
            let score = self.score(detection, frame);
            // 严格大于才替换,保证同分时结果稳定
            let better = best.as_ref().map_or(true, |b| score > b.score);
            if better {
                best = Some(Target {
                    detection: detection.clone(),
                    score,
                });
            }
        }

        best
    }
}
