//! 外部感知能力 (Perception capabilities)
//! 相机采集与检测模型都在核心之外,这里只定义边界接口

use super::types::{Detection, Frame};
use crate::error::Result;

/// 帧来源 (相机/视频流)
pub trait FrameSource: Send {
    /// 获取下一帧; 失败视为本周期无目标
    fn next_frame(&mut self) -> Result<Frame>;
}

/// 人体检测器
///
/// 返回列表无顺序保证; 置信度过滤可由实现方完成,
/// `TargetSelector` 也会按置信度下限再过滤一次
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// 检测器名称 (用于日志)
    fn name(&self) -> &str {
        "detector"
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<Frame> {
        (**self).next_frame()
    }
}

impl<T: Detector + ?Sized> Detector for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
