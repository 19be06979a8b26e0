/// 飞行系统 (Flight System)
///
/// - FlightActuator:     外部飞控能力接口 (解锁/起飞/Offboard/返航/降落/遥测)
/// - FlightModeMachine:  飞行模式状态机,唯一拥有当前模式
pub mod actuator;
pub mod mode;

pub use actuator::{BatteryStatus, FlightActuator, GpsInfo, Position, TelemetrySnapshot};
pub use mode::{
    ActuatorAck, Actuation, FlightMode, FlightModeMachine, ModeInputs, ModeLimits, OffboardMode,
    PipelineSignal, StepOutcome, Transition, TransitionCause,
};
