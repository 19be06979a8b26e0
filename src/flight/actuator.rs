//! 飞控执行接口 (Flight actuator capability)
//! 解锁/起飞/Offboard速度控制/返航/降落,以及遥测读取。
//! 线协议 (MAVLink等) 不在本crate内,由实现方负责。

use std::time::Duration;

use serde::Serialize;

use crate::command::VelocityCommand;
use crate::error::Result;

/// 位置 (相对起飞点高度)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Position {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub relative_altitude_m: f32,
}

/// 电池状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BatteryStatus {
    pub remaining_pct: f32,
    pub voltage_v: f32,
}

/// GPS状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct GpsInfo {
    pub num_satellites: u32,
    pub has_fix: bool,
}

/// 遥测快照 (只读视图,可能过时)
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub connected: bool,
    pub armed: bool,
    pub flying: bool,
    pub position: Position,
    pub battery: BatteryStatus,
    pub gps: GpsInfo,
    pub vehicle_mode: String, // 飞控自身报告的模式 (HOLD/OFFBOARD/RTL/LAND...)
}

impl TelemetrySnapshot {
    pub fn altitude_m(&self) -> f32 {
        self.position.relative_altitude_m
    }
}

/// 飞控能力接口
///
/// 所有操作都可能失败,失败必须以 `PilotError` 返回,不能静默忽略。
/// 只有控制线程调用这些方法,因此实现无需内部同步。
pub trait FlightActuator: Send {
    /// 建立连接
    fn connect(&mut self) -> Result<()>;

    /// 等待GPS定位,超时返回错误
    fn wait_for_lock(&mut self, timeout: Duration) -> Result<GpsInfo>;

    fn arm(&mut self) -> Result<()>;

    fn takeoff(&mut self, altitude_m: f32) -> Result<()>;

    /// 进入Offboard速度控制模式
    fn enable_offboard(&mut self) -> Result<()>;

    fn send_velocity(&mut self, command: &VelocityCommand) -> Result<()>;

    fn return_to_launch(&mut self) -> Result<()>;

    fn land(&mut self) -> Result<()>;

    fn disarm(&mut self) -> Result<()>;

    fn telemetry(&mut self) -> Result<TelemetrySnapshot>;
}

impl<T: FlightActuator + ?Sized> FlightActuator for Box<T> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn wait_for_lock(&mut self, timeout: Duration) -> Result<GpsInfo> {
        (**self).wait_for_lock(timeout)
    }

    fn arm(&mut self) -> Result<()> {
        (**self).arm()
    }

    fn takeoff(&mut self, altitude_m: f32) -> Result<()> {
        (**self).takeoff(altitude_m)
    }

    fn enable_offboard(&mut self) -> Result<()> {
        (**self).enable_offboard()
    }

    fn send_velocity(&mut self, command: &VelocityCommand) -> Result<()> {
        (**self).send_velocity(command)
    }

    fn return_to_launch(&mut self) -> Result<()> {
        (**self).return_to_launch()
    }

    fn land(&mut self) -> Result<()> {
        (**self).land()
    }

    fn disarm(&mut self) -> Result<()> {
        (**self).disarm()
    }

    fn telemetry(&mut self) -> Result<TelemetrySnapshot> {
        (**self).telemetry()
    }
}
