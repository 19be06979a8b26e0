//! 模拟飞行器 (Simulated vehicle)
//!
//! 确定性: 每次读取遥测推进固定步长 `step_secs`,与真实时间无关。
//! 通过 `VehicleHandle` 在运行中注入故障 (电量/GPS/链路/指令失败)。

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::VelocityCommand;
use crate::error::{PilotError, Result};
use crate::flight::{BatteryStatus, FlightActuator, GpsInfo, Position, TelemetrySnapshot};

const METERS_PER_DEGREE: f64 = 111_320.0;
const MIN_LOCK_SATELLITES: u32 = 6;

/// 模拟参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub step_secs: f32,                 // 每次遥测读取推进的模拟时间
    pub climb_rate_m_s: f32,            // 起飞爬升速度
    pub rtl_descent_m_s: f32,           // 返航下降速度
    pub land_descent_m_s: f32,          // 降落下降速度
    pub battery_drain_pct_per_sec: f32, // 解锁后电量消耗
    pub initial_battery_pct: f32,
    pub satellites: u32,
    pub home_latitude_deg: f64,
    pub home_longitude_deg: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            step_secs: 0.05,
            climb_rate_m_s: 2.5,
            rtl_descent_m_s: 1.5,
            land_descent_m_s: 1.0,
            battery_drain_pct_per_sec: 0.05,
            initial_battery_pct: 100.0,
            satellites: 10,
            home_latitude_deg: 47.397742,
            home_longitude_deg: 8.545594,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VehicleMode {
    Hold,
    Takeoff,
    Offboard,
    ReturnToLaunch,
    Land,
}

impl VehicleMode {
    fn label(self) -> &'static str {
        match self {
            VehicleMode::Hold => "HOLD",
            VehicleMode::Takeoff => "TAKEOFF",
            VehicleMode::Offboard => "OFFBOARD",
            VehicleMode::ReturnToLaunch => "RTL",
            VehicleMode::Land => "LAND",
        }
    }
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    link_up: bool,
    connected: bool,
    armed: bool,
    flying: bool,
    mode: VehicleMode,
    altitude_m: f32,
    target_altitude_m: f32,
    latitude_deg: f64,
    longitude_deg: f64,
    battery_pct: f32,
    satellites: u32,
    has_fix: bool,
    velocity: VelocityCommand,
    last_velocity: Option<VelocityCommand>,
    setpoint_received: bool,
    failures: HashSet<String>,
    log: Vec<String>,
}

impl SimState {
    fn new(config: SimConfig) -> Self {
        Self {
            link_up: true,
            connected: false,
            armed: false,
            flying: false,
            mode: VehicleMode::Hold,
            altitude_m: 0.0,
            target_altitude_m: 0.0,
            latitude_deg: config.home_latitude_deg,
            longitude_deg: config.home_longitude_deg,
            battery_pct: config.initial_battery_pct,
            satellites: config.satellites,
            has_fix: true,
            velocity: VelocityCommand::HOVER,
            last_velocity: None,
            setpoint_received: false,
            failures: HashSet::new(),
            log: Vec::new(),
            config,
        }
    }

    /// 推进一个固定步长
    fn advance(&mut self) {
        let dt = self.config.step_secs;
        match self.mode {
            VehicleMode::Takeoff => {
                self.altitude_m = (self.altitude_m + self.config.climb_rate_m_s * dt)
                    .min(self.target_altitude_m);
                if self.altitude_m >= self.target_altitude_m {
                    self.mode = VehicleMode::Hold;
                }
            }
            VehicleMode::Offboard => {
                let v = self.velocity;
                self.altitude_m = (self.altitude_m + v.up_m_s * dt).max(0.0);
                self.latitude_deg += (v.forward_m_s * dt) as f64 / METERS_PER_DEGREE;
                self.longitude_deg += (v.right_m_s * dt) as f64 / METERS_PER_DEGREE;
            }
            VehicleMode::ReturnToLaunch => {
                self.altitude_m -= self.config.rtl_descent_m_s * dt;
                self.latitude_deg = self.config.home_latitude_deg;
                self.longitude_deg = self.config.home_longitude_deg;
            }
            VehicleMode::Land => self.altitude_m -= self.config.land_descent_m_s * dt,
            VehicleMode::Hold => {}
        }

        if self.altitude_m <= 0.0 {
            self.altitude_m = 0.0;
            if matches!(self.mode, VehicleMode::ReturnToLaunch | VehicleMode::Land) {
                self.flying = false;
            }
        }
        if self.armed {
            self.battery_pct =
                (self.battery_pct - self.config.battery_drain_pct_per_sec * dt).max(0.0);
        }
    }

    fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            connected: self.connected && self.link_up,
            armed: self.armed,
            flying: self.flying,
            position: Position {
                latitude_deg: self.latitude_deg,
                longitude_deg: self.longitude_deg,
                relative_altitude_m: self.altitude_m,
            },
            battery: BatteryStatus {
                remaining_pct: self.battery_pct,
                voltage_v: 13.2 + 3.6 * self.battery_pct / 100.0,
            },
            gps: self.gps(),
            vehicle_mode: self.mode.label().to_string(),
        }
    }

    fn gps(&self) -> GpsInfo {
        GpsInfo {
            num_satellites: self.satellites,
            has_fix: self.has_fix && self.satellites >= MIN_LOCK_SATELLITES,
        }
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 故障注入与状态观察句柄 (可跨线程克隆)
#[derive(Clone, Debug)]
pub struct VehicleHandle {
    state: Arc<Mutex<SimState>>,
}

impl VehicleHandle {
    pub fn set_battery(&self, remaining_pct: f32) {
        lock(&self.state).battery_pct = remaining_pct;
    }

    pub fn set_satellites(&self, satellites: u32) {
        lock(&self.state).satellites = satellites;
    }

    pub fn set_gps_fix(&self, has_fix: bool) {
        lock(&self.state).has_fix = has_fix;
    }

    /// 断开/恢复数据链路
    pub fn set_link(&self, up: bool) {
        lock(&self.state).link_up = up;
    }

    pub fn set_altitude(&self, altitude_m: f32) {
        lock(&self.state).altitude_m = altitude_m;
    }

    /// 指定指令 (如 "arm", "send_velocity", "telemetry") 此后一律失败
    pub fn fail_command(&self, command: &str) {
        lock(&self.state).failures.insert(command.to_string());
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }

    /// 已尝试的指令序列 (含失败的)
    pub fn command_log(&self) -> Vec<String> {
        lock(&self.state).log.clone()
    }

    pub fn last_velocity(&self) -> Option<VelocityCommand> {
        lock(&self.state).last_velocity
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.state).armed
    }

    pub fn altitude_m(&self) -> f32 {
        lock(&self.state).altitude_m
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        lock(&self.state).snapshot()
    }
}

/// 模拟飞行器
pub struct SimulatedVehicle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedVehicle {
    pub fn new(config: SimConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(config))),
        }
    }

    pub fn handle(&self) -> VehicleHandle {
        VehicleHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// 记录指令并检查注入的失败/链路状态,然后执行
    fn command<T>(
        &mut self,
        name: &'static str,
        apply: impl FnOnce(&mut SimState) -> std::result::Result<T, String>,
    ) -> Result<T> {
        let mut state = lock(&self.state);
        state.log.push(name.to_string());
        if state.failures.contains(name) {
            return Err(PilotError::actuator(name, "injected failure"));
        }
        if !state.link_up {
            return Err(PilotError::actuator(name, "no link to vehicle"));
        }
        apply(&mut state).map_err(|reason| PilotError::actuator(name, reason))
    }
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl FlightActuator for SimulatedVehicle {
    fn connect(&mut self) -> Result<()> {
        self.command("connect", |s| {
            s.connected = true;
            Ok(())
        })
    }

    fn wait_for_lock(&mut self, timeout: Duration) -> Result<GpsInfo> {
        self.command("wait_for_lock", |s| {
            let gps = s.gps();
            if gps.has_fix {
                Ok(gps)
            } else {
                Err(format!(
                    "no GPS lock within {:.0}s ({} satellites)",
                    timeout.as_secs_f32(),
                    gps.num_satellites
                ))
            }
        })
    }

    fn arm(&mut self) -> Result<()> {
        self.command("arm", |s| {
            if !s.connected {
                return Err("not connected".into());
            }
            if !s.gps().has_fix {
                return Err("no GPS lock".into());
            }
            s.armed = true;
            Ok(())
        })
    }

    fn takeoff(&mut self, altitude_m: f32) -> Result<()> {
        self.command("takeoff", |s| {
            if !s.armed {
                return Err("vehicle not armed".into());
            }
            s.flying = true;
            s.target_altitude_m = altitude_m;
            s.mode = VehicleMode::Takeoff;
            Ok(())
        })
    }

    fn enable_offboard(&mut self) -> Result<()> {
        self.command("enable_offboard", |s| {
            if !s.flying {
                return Err("vehicle not airborne".into());
            }
            // 与真实飞控一致: 没有设定点时拒绝进入Offboard
            if !s.setpoint_received {
                return Err("no setpoint received".into());
            }
            s.mode = VehicleMode::Offboard;
            Ok(())
        })
    }

    fn send_velocity(&mut self, command: &VelocityCommand) -> Result<()> {
        let command = *command;
        self.command("send_velocity", move |s| {
            s.velocity = command;
            s.last_velocity = Some(command);
            s.setpoint_received = true;
            Ok(())
        })
    }

    fn return_to_launch(&mut self) -> Result<()> {
        self.command("return_to_launch", |s| {
            s.mode = VehicleMode::ReturnToLaunch;
            Ok(())
        })
    }

    fn land(&mut self) -> Result<()> {
        self.command("land", |s| {
            s.mode = VehicleMode::Land;
            Ok(())
        })
    }

    fn disarm(&mut self) -> Result<()> {
        self.command("disarm", |s| {
            if s.altitude_m >= 0.5 {
                return Err(format!("vehicle airborne at {:.1}m", s.altitude_m));
            }
            s.armed = false;
            s.flying = false;
            s.mode = VehicleMode::Hold;
            s.setpoint_received = false;
            Ok(())
        })
    }

    fn telemetry(&mut self) -> Result<TelemetrySnapshot> {
        let mut state = lock(&self.state);
        if state.failures.contains("telemetry") {
            return Err(PilotError::actuator("telemetry", "injected failure"));
        }
        state.advance();
        Ok(state.snapshot())
    }
}
