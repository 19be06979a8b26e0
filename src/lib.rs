// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod command; // 运动意图与速度指令
pub mod config; // 跟随配置 (JSON)
pub mod detection; // 检测数据与目标选择
pub mod error; // 错误分类
pub mod flight; // 飞控接口与飞行模式状态机
pub mod pipeline; // 感知/控制双线程流水线
pub mod safety; // 安全监控
pub mod sim; // 模拟飞行器与相机

pub use crate::command::{
    CommandConfig, CommandGenerator, Intent, SmoothingConfig, TemporalSmoother, VelocityCommand,
    VelocityLimits,
};
pub use crate::config::{ControlConfig, FollowConfig, PerceptionConfig};
pub use crate::detection::{
    Detection, Detector, Frame, FrameSize, FrameSource, SelectionConfig, Target, TargetSelector,
    TrackingHistory,
};
pub use crate::error::{PilotError, Result};
pub use crate::flight::{
    FlightActuator, FlightMode, FlightModeMachine, OffboardMode, TelemetrySnapshot,
};
pub use crate::pipeline::{run_mission, MissionSummary, ShutdownToken, TransitionJournal};
pub use crate::safety::{SafetyMonitor, SafetyThresholds, SafetyVerdict, Severity};
