/// 检测系统 (Detection System)
///
/// 感知阶段的纯逻辑部分,运行在感知线程
/// - Detector/FrameSource: 外部相机与检测模型的接口
/// - TargetSelector:       多目标打分,每周期选一个
/// - TrackingHistory:      有界跟踪历史 (平滑 + 丢失计时)
pub mod detector;
pub mod history;
pub mod selector;
pub mod types;

pub use detector::{Detector, FrameSource};
pub use history::{HistoryEntry, TrackingHistory, DEFAULT_HISTORY_CAPACITY};
pub use selector::{SelectionConfig, TargetSelector};
pub use types::{Detection, Frame, FrameSize, Target};
