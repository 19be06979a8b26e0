/// 安全系统 (Safety System)
///
/// 每个控制周期在发送指令前执行一次,判定可以否决本周期的指令
pub mod monitor;

pub use monitor::{
    SafetyInput, SafetyMonitor, SafetyThresholds, SafetyVerdict, Severity, ViolationReason,
};
