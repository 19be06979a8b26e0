//! 检测系统数据结构定义
//! Data structures for the person detection stage

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::error::{PilotError, Result};

// ========== 公共常量 ==========

/// 默认相机分辨率
pub const DEFAULT_FRAME_WIDTH: u32 = 640;
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;

// ========== 数据结构 ==========

/// 画面尺寸 (像素)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 画面中心点
    pub fn center(&self) -> (f32, f32) {
        (self.width as f32 / 2.0, self.height as f32 / 2.0)
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT)
    }
}

/// 相机帧 (采集 → 检测)
///
/// 像素数据对核心流水线不透明,只用于交给外部检测器
#[derive(Clone, Debug)]
pub struct Frame {
    pub frame_id: u64, // 帧序号
    pub size: FrameSize,
    pub captured_at: Instant,
    pub rgb_data: Arc<Vec<u8>>, // 使用Arc共享数据,避免复制
}

impl Frame {
    pub fn new(frame_id: u64, size: FrameSize, captured_at: Instant) -> Self {
        Self {
            frame_id,
            size,
            captured_at,
            rgb_data: Arc::new(Vec::new()),
        }
    }
}

/// 人体检测框 (Person detection bounding box)
///
/// 创建后不可变: 字段私有,中心点和尺寸由角点推导
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
}

impl Detection {
    /// 由角点构造,要求 x1<x2, y1<y2, confidence ∈ [0,1]
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Result<Self> {
        let finite = [x1, y1, x2, y2, confidence].iter().all(|v| v.is_finite());
        if !finite {
            return Err(PilotError::Perception(format!(
                "non-finite detection ({x1}, {y1}, {x2}, {y2}, conf={confidence})"
            )));
        }
        if x1 >= x2 || y1 >= y2 {
            return Err(PilotError::Perception(format!(
                "degenerate bbox ({x1}, {y1}) - ({x2}, {y2})"
            )));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(PilotError::Perception(format!(
                "confidence {confidence} outside [0, 1]"
            )));
        }
        Ok(Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
        })
    }

    /// 由中心点和宽高构造
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32, confidence: f32) -> Result<Self> {
        Self::new(
            cx - w / 2.0,
            cy - h / 2.0,
            cx + w / 2.0,
            cy + h / 2.0,
            confidence,
        )
    }

    pub fn x1(&self) -> f32 {
        self.x1
    }

    pub fn y1(&self) -> f32 {
        self.y1
    }

    pub fn x2(&self) -> f32 {
        self.x2
    }

    pub fn y2(&self) -> f32 {
        self.y2
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// 获取中心点
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// 获取宽高
    pub fn size(&self) -> (f32, f32) {
        (self.x2 - self.x1, self.y2 - self.y1)
    }

    /// 最大边长 (用于距离估计)
    pub fn extent(&self) -> f32 {
        let (w, h) = self.size();
        w.max(h)
    }
}

/// 本周期选中的跟踪目标
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Target {
    pub detection: Detection,
    pub score: f32,
}

impl Target {
    pub fn center(&self) -> (f32, f32) {
        self.detection.center()
    }

    pub fn size(&self) -> (f32, f32) {
        self.detection.size()
    }
}
