//! 飞行模式状态机 (Flight mode machine)
//!
//! ```text
//! Idle → Arming → TakingOff → Offboard(Hovering ⇄ Following) → ReturningToLaunch → Landed → Idle
//!                                                    ↘ EmergencyLanding ↗
//! ```
//!
//! 每次转移都是 (当前状态, 本周期安全判定, 本周期流水线信号, 飞控确认, 高度) 的全函数,
//! 不依赖更早的历史。表外组合 (例如 Idle 收到目标信号) 为空操作。
//! 唯一的写者是控制线程。

use std::fmt;

use serde::Serialize;

use crate::command::Intent;
use crate::safety::{SafetyVerdict, Severity, ViolationReason};

/// Offboard 子状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum OffboardMode {
    Following,
    Hovering,
}

/// 飞行模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FlightMode {
    Idle,
    Arming,
    TakingOff,
    Offboard(OffboardMode),
    ReturningToLaunch,
    EmergencyLanding,
    Landed,
}

impl FlightMode {
    pub fn is_offboard(&self) -> bool {
        matches!(self, FlightMode::Offboard(_))
    }

    /// 正在返航或降落
    pub fn is_recovering(&self) -> bool {
        matches!(
            self,
            FlightMode::ReturningToLaunch | FlightMode::EmergencyLanding
        )
    }

    /// Idle / Landed: 紧急降落不可达
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlightMode::Idle | FlightMode::Landed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FlightMode::Idle => "Idle",
            FlightMode::Arming => "Arming",
            FlightMode::TakingOff => "TakingOff",
            FlightMode::Offboard(OffboardMode::Following) => "Offboard(Following)",
            FlightMode::Offboard(OffboardMode::Hovering) => "Offboard(Hovering)",
            FlightMode::ReturningToLaunch => "ReturningToLaunch",
            FlightMode::EmergencyLanding => "EmergencyLanding",
            FlightMode::Landed => "Landed",
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 本周期流水线信号
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PipelineSignal {
    /// 通道本周期无新数据 (仅本周期视为无目标,不等于目标丢失)
    None,
    StartRequested,
    StopRequested,
    /// 新数据中有目标,携带平滑后的意图
    Target(Intent),
    /// 新数据中没有目标
    NoTarget,
}

/// 飞控确认
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActuatorAck {
    Armed,
    Disarmed,
}

/// 状态机单周期输入
#[derive(Clone, Copy, Debug)]
pub struct ModeInputs {
    pub verdict: SafetyVerdict,
    pub signal: PipelineSignal,
    pub ack: Option<ActuatorAck>,
    /// None: 本周期无有效遥测
    pub altitude_m: Option<f32>,
    pub gps_locked: bool,
}

impl ModeInputs {
    pub fn new(verdict: SafetyVerdict, signal: PipelineSignal) -> Self {
        Self {
            verdict,
            signal,
            ack: None,
            altitude_m: None,
            gps_locked: false,
        }
    }

    pub fn with_ack(mut self, ack: ActuatorAck) -> Self {
        self.ack = Some(ack);
        self
    }

    pub fn with_altitude(mut self, altitude_m: f32) -> Self {
        self.altitude_m = Some(altitude_m);
        self
    }

    pub fn with_gps_lock(mut self, locked: bool) -> Self {
        self.gps_locked = locked;
        self
    }
}

/// 转移原因
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum TransitionCause {
    StartRequested,
    ArmAcknowledged,
    TakeoffComplete,
    TargetAcquired,
    TargetLost,
    SafetyWarning(ViolationReason),
    SafetyCritical(ViolationReason),
    StopRequested,
    Touchdown,
    DisarmAcknowledged,
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionCause::SafetyWarning(reason) => write!(f, "warning: {reason}"),
            TransitionCause::SafetyCritical(reason) => write!(f, "critical: {reason}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Transition {
    pub from: FlightMode,
    pub to: FlightMode,
    pub cause: TransitionCause,
}

/// 状态机要求控制线程执行的飞控动作
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Actuation {
    None,
    Arm,
    Takeoff { altitude_m: f32 },
    EnableOffboard,
    Velocity(Intent),
    ReturnToLaunch,
    Land,
    Disarm,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepOutcome {
    pub transition: Option<Transition>,
    pub actuation: Actuation,
}

/// 起飞/着陆判定参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModeLimits {
    pub takeoff_altitude_m: f32,
    pub takeoff_complete_ratio: f32, // 达到目标高度的比例即视为起飞完成
    pub touchdown_altitude_m: f32,   // 低于此高度视为已着陆
}

impl Default for ModeLimits {
    fn default() -> Self {
        Self {
            takeoff_altitude_m: 5.0,
            takeoff_complete_ratio: 0.9,
            touchdown_altitude_m: 0.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FlightModeMachine {
    mode: FlightMode,
    limits: ModeLimits,
}

impl FlightModeMachine {
    pub fn new(limits: ModeLimits) -> Self {
        Self {
            mode: FlightMode::Idle,
            limits,
        }
    }

    pub fn mode(&self) -> FlightMode {
        self.mode
    }

    pub fn limits(&self) -> &ModeLimits {
        &self.limits
    }

    /// 推进一个周期: 计算转移,并给出本周期的飞控动作
    pub fn step(&mut self, inputs: &ModeInputs) -> StepOutcome {
        match self.next_mode(inputs) {
            Some((to, cause)) => {
                let from = self.mode;
                self.mode = to;
                StepOutcome {
                    transition: Some(Transition { from, to, cause }),
                    actuation: self.entry_action(from, inputs),
                }
            }
            None => StepOutcome {
                transition: None,
                actuation: self.steady_action(inputs),
            },
        }
    }

    fn next_mode(&self, inputs: &ModeInputs) -> Option<(FlightMode, TransitionCause)> {
        use FlightMode::*;

        match self.mode {
            Idle => match inputs.signal {
                PipelineSignal::StartRequested if inputs.gps_locked => {
                    Some((Arming, TransitionCause::StartRequested))
                }
                _ => None,
            },
            Landed => (inputs.ack == Some(ActuatorAck::Disarmed))
                .then_some((Idle, TransitionCause::DisarmAcknowledged)),
            EmergencyLanding => self
                .touched_down(inputs)
                .then_some((Landed, TransitionCause::Touchdown)),
            // 需要立即降落的危急判定: 除 Idle/Landed 外任何状态一个周期内进入紧急降落
            _ if inputs.verdict.requires_immediate_descent() => {
                let reason = inputs.verdict.reason()?;
                Some((EmergencyLanding, TransitionCause::SafetyCritical(reason)))
            }
            Arming => (inputs.ack == Some(ActuatorAck::Armed))
                .then_some((TakingOff, TransitionCause::ArmAcknowledged)),
            TakingOff => {
                let reached = self.limits.takeoff_altitude_m * self.limits.takeoff_complete_ratio;
                match inputs.altitude_m {
                    Some(alt) if alt >= reached => Some((
                        Offboard(OffboardMode::Hovering),
                        TransitionCause::TakeoffComplete,
                    )),
                    _ => None,
                }
            }
            Offboard(sub) => Self::next_offboard(sub, inputs),
            ReturningToLaunch => self
                .touched_down(inputs)
                .then_some((Landed, TransitionCause::Touchdown)),
        }
    }

    fn next_offboard(
        sub: OffboardMode,
        inputs: &ModeInputs,
    ) -> Option<(FlightMode, TransitionCause)> {
        let verdict = &inputs.verdict;

        if let SafetyVerdict::Violation {
            reason,
            severity: Severity::Critical,
        } = verdict
        {
            return Some((
                FlightMode::ReturningToLaunch,
                TransitionCause::SafetyCritical(*reason),
            ));
        }
        if inputs.signal == PipelineSignal::StopRequested {
            return Some((FlightMode::ReturningToLaunch, TransitionCause::StopRequested));
        }

        let hovering = FlightMode::Offboard(OffboardMode::Hovering);
        match sub {
            OffboardMode::Following => match verdict {
                SafetyVerdict::Violation {
                    reason,
                    severity: Severity::Warn,
                } => Some((hovering, TransitionCause::SafetyWarning(*reason))),
                v if v.is_target_lost() => Some((hovering, TransitionCause::TargetLost)),
                _ => None,
            },
            OffboardMode::Hovering => match inputs.signal {
                PipelineSignal::Target(_) if verdict.is_ok() => Some((
                    FlightMode::Offboard(OffboardMode::Following),
                    TransitionCause::TargetAcquired,
                )),
                _ => None,
            },
        }
    }

    fn touched_down(&self, inputs: &ModeInputs) -> bool {
        matches!(inputs.altitude_m, Some(alt) if alt < self.limits.touchdown_altitude_m)
    }

    /// 进入新状态时的动作
    fn entry_action(&self, from: FlightMode, inputs: &ModeInputs) -> Actuation {
        match self.mode {
            FlightMode::Idle => Actuation::None,
            FlightMode::Arming => Actuation::Arm,
            FlightMode::TakingOff => Actuation::Takeoff {
                altitude_m: self.limits.takeoff_altitude_m,
            },
            FlightMode::Offboard(_) if !from.is_offboard() => Actuation::EnableOffboard,
            FlightMode::Offboard(_) => self.steady_action(inputs),
            FlightMode::ReturningToLaunch => Actuation::ReturnToLaunch,
            FlightMode::EmergencyLanding => Actuation::Land,
            FlightMode::Landed => Actuation::Disarm,
        }
    }

    /// 保持当前状态时的动作
    fn steady_action(&self, inputs: &ModeInputs) -> Actuation {
        match self.mode {
            FlightMode::Offboard(OffboardMode::Following) => match inputs.signal {
                PipelineSignal::Target(intent) => Actuation::Velocity(intent.clamped()),
                _ => Actuation::Velocity(Intent::ZERO),
            },
            FlightMode::Offboard(OffboardMode::Hovering) => Actuation::Velocity(Intent::ZERO),
            _ => Actuation::None,
        }
    }

    /// 仅用于测试: 直接置入指定状态
    #[cfg(test)]
    pub(crate) fn force_mode(&mut self, mode: FlightMode) {
        self.mode = mode;
    }
}

impl Default for FlightModeMachine {
    fn default() -> Self {
        Self::new(ModeLimits::default())
    }
}
