//! 控制线程 (Control loop)
//! 职责: 启动流程 → 每周期 [取最新跟踪数据 → 读遥测 → 安全判定 → 模式机 → 执行动作] → 返航/降落监督
//!
//! 唯一写 FlightMode、唯一调用 FlightActuator 指令接口的线程。
//! 安全判定紧接在指令发送之前,同一周期内可以否决指令。
//! 失败的指令不重试,下一周期的指令自然覆盖。

use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::channel::TrackingReceiver;
use super::journal::TransitionJournal;
use super::shutdown::{ShutdownToken, Ticker};
use crate::command::{CommandHistory, VelocityCommand};
use crate::config::ControlConfig;
use crate::error::{PilotError, Result};
use crate::flight::{
    ActuatorAck, Actuation, FlightActuator, FlightMode, FlightModeMachine, ModeInputs,
    PipelineSignal, StepOutcome, TelemetrySnapshot, Transition,
};
use crate::safety::{SafetyInput, SafetyMonitor, SafetyThresholds, SafetyVerdict, Severity};

/// 控制统计
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControlStats {
    pub ticks: u64,
    pub commands_sent: u64,
    pub command_failures: u64,
    pub telemetry_failures: u64,
}

/// 跟踪阶段结束原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackingExit {
    Shutdown,
    DurationElapsed,
    /// 安全判定使飞机离开 Offboard
    SafetyRecovery,
}

/// 一次任务的结果
#[derive(Clone, Debug)]
pub struct ControlReport {
    pub exit: TrackingExit,
    pub final_mode: FlightMode,
    /// 是否在监督超时内完成着陆并上锁
    pub landed: bool,
    pub transitions: Vec<Transition>,
    pub stats: ControlStats,
}

pub struct ControlLoop<A> {
    actuator: A,
    machine: FlightModeMachine,
    monitor: SafetyMonitor,
    rx: TrackingReceiver,
    journal: TransitionJournal,
    config: ControlConfig,

    flight_start: Option<Instant>,
    last_target_seen: Option<Instant>,
    pending_ack: Option<ActuatorAck>,
    last_severity: Option<Severity>,
    last_telemetry: Option<TelemetrySnapshot>,
    last_status: Option<Instant>,
    commands: CommandHistory,
    transitions: Vec<Transition>,
    stats: ControlStats,
}

impl<A: FlightActuator> ControlLoop<A> {
    pub fn new(
        config: ControlConfig,
        thresholds: SafetyThresholds,
        actuator: A,
        rx: TrackingReceiver,
        journal: TransitionJournal,
    ) -> Self {
        Self {
            actuator,
            machine: FlightModeMachine::new(config.mode_limits()),
            monitor: SafetyMonitor::new(thresholds),
            rx,
            journal,
            commands: CommandHistory::new(config.command_history),
            config,
            flight_start: None,
            last_target_seen: None,
            pending_ack: None,
            last_severity: None,
            last_telemetry: None,
            last_status: None,
            transitions: Vec::new(),
            stats: ControlStats::default(),
        }
    }

    pub fn mode(&self) -> FlightMode {
        self.machine.mode()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn commands(&self) -> &CommandHistory {
        &self.commands
    }

    pub fn stats(&self) -> &ControlStats {
        &self.stats
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    // ========== 启动流程 ==========

    /// 连接 → GPS锁定 → 解锁 → 起飞 → 零速度设定点 → Offboard(Hovering)
    ///
    /// 任一步失败返回 `Initialization`,系统不会进入 Offboard;
    /// 解锁后失败会尽力执行 降落 + 上锁。
    pub fn initialize(&mut self) -> Result<()> {
        info!("🔌 连接飞控...");
        self.actuator
            .connect()
            .map_err(|e| PilotError::Initialization(format!("connect: {e}")))?;

        info!("🛰️  等待GPS锁定 (超时 {:.0}s)...", self.config.gps_timeout_secs);
        let gps = self
            .actuator
            .wait_for_lock(self.config.gps_timeout())
            .map_err(|e| PilotError::Initialization(format!("GPS lock: {e}")))?;
        info!("✅ GPS已锁定: {} 颗卫星", gps.num_satellites);

        let start = ModeInputs::new(SafetyVerdict::Ok, PipelineSignal::StartRequested)
            .with_gps_lock(true);
        self.step_and_execute_init(&start)?;

        // 解锁成功之后的失败需要清理
        let result = self.climb_and_enter_offboard();
        if let Err(e) = &result {
            error!("❌ 启动失败: {}", e);
            self.abort_cleanup();
        }
        result
    }

    fn climb_and_enter_offboard(&mut self) -> Result<()> {
        let mut armed = ModeInputs::new(SafetyVerdict::Ok, PipelineSignal::None);
        armed.ack = self.pending_ack.take();
        self.step_and_execute_init(&armed)?;

        let deadline = Instant::now() + self.config.takeoff_timeout();
        let mut ticker = Ticker::new(self.config.rate_hz);
        loop {
            let now = ticker.wait();
            if now > deadline {
                return Err(PilotError::Initialization(format!(
                    "takeoff altitude not reached within {:.1}s",
                    self.config.takeoff_timeout_secs
                )));
            }

            let telemetry = self.fetch_telemetry();
            let verdict = self.monitor.evaluate(&SafetyInput {
                telemetry: telemetry.as_ref(),
                flight_start: None,
                last_target_seen: None,
                now,
            });
            let mut inputs = ModeInputs::new(verdict, PipelineSignal::None);
            inputs.altitude_m = telemetry
                .as_ref()
                .filter(|t| t.connected)
                .map(TelemetrySnapshot::altitude_m);

            self.step_and_execute_init(&inputs)?;
            match self.machine.mode() {
                FlightMode::Offboard(_) => {
                    self.flight_start = Some(now);
                    info!("🚁 起飞完成,进入Offboard悬停");
                    return Ok(());
                }
                FlightMode::EmergencyLanding => {
                    return Err(PilotError::Initialization(format!(
                        "safety violation during takeoff: {verdict}"
                    )));
                }
                _ => {}
            }
        }
    }

    /// 启动阶段: 任何动作失败都是致命的
    fn step_and_execute_init(&mut self, inputs: &ModeInputs) -> Result<()> {
        let outcome = self.step(inputs);
        self.execute(outcome.actuation, Instant::now())
            .map_err(|e| PilotError::Initialization(e.to_string()))
    }

    /// 尽力降落并上锁,失败只记录
    fn abort_cleanup(&mut self) {
        // 启用Offboard失败时模式机已切换,按停止请求退出Offboard
        if self.machine.mode().is_offboard() {
            let stop = ModeInputs::new(SafetyVerdict::Ok, PipelineSignal::StopRequested);
            self.step(&stop);
        }
        if self.machine.mode().is_terminal() {
            return;
        }
        warn!("⚠️  启动中止: 尝试降落并上锁");
        if let Err(e) = self.actuator.land() {
            error!("❌ 降落失败: {}", e);
        }
        // 空中上锁会直接停桨
        if !self.await_touchdown() {
            error!(
                "❌ {:.1}s 内未确认着陆,不执行上锁",
                self.config.landing_timeout_secs
            );
            return;
        }
        if let Err(e) = self.actuator.disarm() {
            error!("❌ 上锁失败: {}", e);
        }
    }

    /// 等待遥测高度低于着陆阈值,超时返回 false
    fn await_touchdown(&mut self) -> bool {
        let deadline = Instant::now() + self.config.landing_timeout();
        let mut ticker = Ticker::new(self.config.rate_hz);
        loop {
            let now = ticker.wait();
            let altitude = self
                .fetch_telemetry()
                .filter(|t| t.connected)
                .map(|t| t.altitude_m());
            if matches!(altitude, Some(alt) if alt < self.config.touchdown_altitude_m) {
                return true;
            }
            if now >= deadline {
                return false;
            }
        }
    }

    // ========== 周期控制 ==========

    /// 单个控制周期
    pub fn tick(&mut self, now: Instant, stop_requested: bool) -> StepOutcome {
        self.stats.ticks += 1;

        // 1. 非阻塞取最新跟踪数据; 被跳过的消息中的目标也计入
        let sample = self.rx.latest();
        if let Some(seen) = self.rx.last_target_seen() {
            self.last_target_seen = Some(seen);
        }

        // 2. 遥测 + 安全判定
        let telemetry = self.fetch_telemetry();
        let verdict = self.monitor.evaluate(&SafetyInput {
            telemetry: telemetry.as_ref(),
            flight_start: self.flight_start,
            last_target_seen: self.last_target_seen,
            now,
        });
        self.note_verdict(&verdict);

        // 3. 模式机
        let signal = if stop_requested {
            PipelineSignal::StopRequested
        } else {
            match &sample {
                None => PipelineSignal::None,
                Some(s) if s.has_target() => PipelineSignal::Target(s.intent),
                Some(_) => PipelineSignal::NoTarget,
            }
        };
        let thresholds = self.monitor.thresholds();
        let connected = telemetry.as_ref().filter(|t| t.connected);
        let inputs = ModeInputs {
            verdict,
            signal,
            ack: self.pending_ack.take(),
            altitude_m: connected.map(TelemetrySnapshot::altitude_m),
            gps_locked: connected.map_or(false, |t| {
                t.gps.num_satellites >= thresholds.min_satellites
                    && (t.gps.has_fix || !thresholds.require_gps_fix)
            }),
        };
        let outcome = self.step(&inputs);

        // 4. 执行 (失败不重试)
        if let Err(e) = self.execute(outcome.actuation, now) {
            if e.is_absorbable() {
                warn!("⚠️  {} (模式 {})", e, self.machine.mode());
            } else {
                error!("❌ {} (模式 {})", e, self.machine.mode());
            }
        }

        if telemetry.is_some() {
            self.last_telemetry = telemetry;
        }
        self.report_status(now);
        outcome
    }

    fn fetch_telemetry(&mut self) -> Option<TelemetrySnapshot> {
        match self.actuator.telemetry() {
            Ok(t) => Some(t),
            Err(e) => {
                self.stats.telemetry_failures += 1;
                warn!("⚠️  遥测读取失败: {}", e);
                None
            }
        }
    }

    fn step(&mut self, inputs: &ModeInputs) -> StepOutcome {
        let outcome = self.machine.step(inputs);
        if let Some(transition) = outcome.transition {
            info!(
                "🔄 模式切换: {} → {} ({})",
                transition.from, transition.to, transition.cause
            );
            if let Err(e) = self.journal.record_transition(&transition) {
                error!("❌ 写入事件日志失败: {}", e);
            }
            self.transitions.push(transition);
        }
        outcome
    }

    /// 判定严重程度上升时记录
    fn note_verdict(&mut self, verdict: &SafetyVerdict) {
        let severity = verdict.severity();
        if severity > self.last_severity {
            match severity {
                Some(Severity::Critical) => error!("🚨 安全违规: {}", verdict),
                Some(Severity::Warn) => warn!("⚠️  安全警告: {}", verdict),
                _ => info!("ℹ️  {}", verdict),
            }
            if let Err(e) = self.journal.record_verdict(self.machine.mode(), verdict) {
                error!("❌ 写入事件日志失败: {}", e);
            }
        } else if severity.is_none() && self.last_severity.is_some() {
            info!("✅ 安全状态恢复正常");
        }
        self.last_severity = severity;
    }

    /// 执行状态机给出的动作
    fn execute(&mut self, actuation: Actuation, now: Instant) -> Result<()> {
        match actuation {
            Actuation::None => Ok(()),
            Actuation::Arm => {
                info!("🔓 解锁...");
                self.actuator.arm()?;
                self.pending_ack = Some(ActuatorAck::Armed);
                Ok(())
            }
            Actuation::Takeoff { altitude_m } => {
                info!("🛫 起飞至 {:.1}m...", altitude_m);
                self.actuator.takeoff(altitude_m)
            }
            Actuation::EnableOffboard => {
                // 进入Offboard前必须先有设定点
                self.send(VelocityCommand::HOVER, now)?;
                info!("🎮 启用Offboard模式...");
                self.actuator.enable_offboard()
            }
            Actuation::Velocity(intent) => {
                let command = VelocityCommand::from_intent(&intent, &self.config.velocity);
                self.send(command, now)
            }
            Actuation::ReturnToLaunch => {
                info!("🏠 返航...");
                self.actuator.return_to_launch()
            }
            Actuation::Land => {
                warn!("🛬 紧急降落!");
                self.actuator.land()
            }
            Actuation::Disarm => {
                info!("🔒 上锁...");
                self.actuator.disarm()?;
                self.pending_ack = Some(ActuatorAck::Disarmed);
                Ok(())
            }
        }
    }

    fn send(&mut self, command: VelocityCommand, now: Instant) -> Result<()> {
        match self.actuator.send_velocity(&command) {
            Ok(()) => {
                self.stats.commands_sent += 1;
                self.commands.push(now, command);
                Ok(())
            }
            Err(e) => {
                self.stats.command_failures += 1;
                Err(e)
            }
        }
    }

    fn report_status(&mut self, now: Instant) {
        let due = self
            .last_status
            .map_or(true, |t| now.saturating_duration_since(t) >= self.config.status_interval());
        if !due {
            return;
        }
        self.last_status = Some(now);

        let Some(t) = &self.last_telemetry else {
            info!("📊 模式: {} | 无遥测", self.machine.mode());
            return;
        };
        let command = self
            .commands
            .last()
            .map(|(_, c)| *c)
            .unwrap_or(VelocityCommand::HOVER);
        info!(
            "📊 模式: {} ({}) | 高度: {:.1}m | 电量: {:.0}% | 卫星: {} | 指令: 前{:.2} 右{:.2} 上{:.2} 偏航{:.1}°/s",
            self.machine.mode(),
            t.vehicle_mode,
            t.altitude_m(),
            t.battery.remaining_pct,
            t.gps.num_satellites,
            command.forward_m_s,
            command.right_m_s,
            command.up_m_s,
            command.yaw_rate_deg_s
        );
    }

    // ========== 主循环 ==========

    /// 跟踪阶段 (受运行时长约束) + 返航/降落监督
    ///
    /// 调用前必须已完成 `initialize`。停机信号或运行时长到期时请求返航;
    /// 之后继续执行安全判定与模式机,直到上锁回到 Idle 或监督超时。
    pub fn run(&mut self, shutdown: &ShutdownToken) -> ControlReport {
        info!("🎯 开始跟随 (最长 {:.0}s)", self.config.run_duration_secs);
        let mut ticker = Ticker::new(self.config.rate_hz);
        let deadline = Instant::now() + self.config.run_duration();

        let exit = loop {
            let now = ticker.wait();
            if !self.machine.mode().is_offboard() {
                break TrackingExit::SafetyRecovery;
            }
            if shutdown.is_triggered() {
                info!("🛑 收到停机信号,返航");
                self.tick(now, true);
                break TrackingExit::Shutdown;
            }
            if now >= deadline {
                info!("⏱️  运行时长已到,返航");
                self.tick(now, true);
                break TrackingExit::DurationElapsed;
            }
            self.tick(now, false);
        };

        let landed = self.supervise_landing(&mut ticker);
        ControlReport {
            exit,
            final_mode: self.machine.mode(),
            landed,
            transitions: self.transitions.clone(),
            stats: self.stats.clone(),
        }
    }

    fn supervise_landing(&mut self, ticker: &mut Ticker) -> bool {
        let timeout = self.config.landing_timeout();
        let deadline = Instant::now() + timeout;
        debug!("🛬 降落监督 (超时 {:.0}s)", timeout.as_secs_f32());

        loop {
            let now = ticker.wait();
            match self.machine.mode() {
                FlightMode::Idle => {
                    info!("✅ 已着陆并上锁");
                    return true;
                }
                // 停机信号已处理但仍在Offboard (例如指令失败): 继续请求返航
                mode if mode.is_offboard() => {
                    self.tick(now, true);
                }
                _ => {
                    self.tick(now, false);
                }
            }
            if now >= deadline {
                error!(
                    "❌ {:.0}s 内未完成着陆 (模式 {}), 尝试原地降落",
                    timeout.as_secs_f32(),
                    self.machine.mode()
                );
                if let Err(e) = self.actuator.land() {
                    error!("❌ 降落失败: {}", e);
                }
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Intent;
    use crate::detection::{Detection, Target};
    use crate::flight::{OffboardMode, TransitionCause};
    use crate::safety::ViolationReason;
    use std::time::Duration;
    use crate::pipeline::{tracking_channel, TrackingSample, TrackingSender};
    use crate::sim::{SimConfig, SimulatedVehicle, VehicleHandle};

    fn fast_config() -> ControlConfig {
        ControlConfig {
            rate_hz: 1000.0,
            run_duration_secs: 0.05,
            landing_timeout_secs: 5.0,
            takeoff_timeout_secs: 5.0,
            ..ControlConfig::default()
        }
    }

    fn setup(
        thresholds: SafetyThresholds,
    ) -> (ControlLoop<SimulatedVehicle>, VehicleHandle, TrackingSender) {
        setup_with(SimConfig::default(), fast_config(), thresholds)
    }

    fn setup_with(
        sim: SimConfig,
        config: ControlConfig,
        thresholds: SafetyThresholds,
    ) -> (ControlLoop<SimulatedVehicle>, VehicleHandle, TrackingSender) {
        let vehicle = SimulatedVehicle::new(sim);
        let handle = vehicle.handle();
        let (tx, rx) = tracking_channel(10);
        let journal = TransitionJournal::disabled();
        let control = ControlLoop::new(config, thresholds, vehicle, rx, journal);
        (control, handle, tx)
    }

    fn no_target_sample(now: Instant) -> TrackingSample {
        TrackingSample {
            frame_id: 2,
            target: None,
            intent: Intent::ZERO,
            timestamp: now,
        }
    }

    fn target_sample(now: Instant, intent: Intent) -> TrackingSample {
        TrackingSample {
            frame_id: 1,
            target: Some(Target {
                detection: Detection::from_center(500.0, 240.0, 200.0, 200.0, 0.9).unwrap(),
                score: 200.0,
            }),
            intent,
            timestamp: now,
        }
    }

    #[test]
    fn test_initialize_reaches_hovering() {
        let (mut control, handle, _tx) = setup(SafetyThresholds::default());
        control.initialize().unwrap();
        assert_eq!(control.mode(), FlightMode::Offboard(OffboardMode::Hovering));

        // 进入Offboard之前先发送零速度设定点
        let log = handle.command_log();
        let offboard = log.iter().position(|c| c == "enable_offboard").unwrap();
        assert_eq!(log[offboard - 1], "send_velocity");
        assert!(control.commands().last().unwrap().1.is_hover());
    }

    #[test]
    fn test_initialize_without_gps_aborts() {
        let (mut control, handle, _tx) = setup(SafetyThresholds::default());
        handle.set_satellites(3);
        let err = control.initialize().unwrap_err();
        assert!(matches!(err, PilotError::Initialization(_)));
        assert_eq!(control.mode(), FlightMode::Idle);
        assert!(!handle.command_log().iter().any(|c| c == "arm"));
    }

    #[test]
    fn test_offboard_failure_cleans_up() {
        let (mut control, handle, _tx) = setup(SafetyThresholds::default());
        handle.fail_command("enable_offboard");
        let err = control.initialize().unwrap_err();
        assert!(matches!(err, PilotError::Initialization(_)));
        assert!(!control.mode().is_offboard());
        let log = handle.command_log();
        assert!(log.iter().any(|c| c == "land"));
        assert_eq!(log.last().map(String::as_str), Some("disarm"));
    }

    #[test]
    fn test_takeoff_timeout_aborts_and_lands() {
        let sim = SimConfig {
            climb_rate_m_s: 0.01,
            ..SimConfig::default()
        };
        let config = ControlConfig {
            takeoff_timeout_secs: 0.2,
            ..fast_config()
        };
        let (mut control, handle, _tx) = setup_with(sim, config, SafetyThresholds::default());

        let err = control.initialize().unwrap_err();
        assert!(matches!(err, PilotError::Initialization(_)));
        assert!(err.to_string().contains("0.2s"));
        assert_eq!(control.mode(), FlightMode::TakingOff);

        let log = handle.command_log();
        let takeoff = log.iter().position(|c| c == "takeoff").unwrap();
        let land = log.iter().position(|c| c == "land").unwrap();
        assert!(takeoff < land);
        assert!(!log.iter().any(|c| c == "enable_offboard"));
        assert_eq!(log.last().map(String::as_str), Some("disarm"));
        assert!(!handle.is_armed());
    }

    #[test]
    fn test_critical_battery_during_climb_aborts() {
        let (mut control, handle, _tx) = setup(SafetyThresholds::default());
        handle.set_battery(9.0);

        let err = control.initialize().unwrap_err();
        assert!(matches!(err, PilotError::Initialization(_)));
        assert_eq!(control.mode(), FlightMode::EmergencyLanding);
        let emergency = control.transitions().last().unwrap();
        assert_eq!(emergency.from, FlightMode::TakingOff);
        assert!(matches!(
            emergency.cause,
            TransitionCause::SafetyCritical(ViolationReason::BatteryCritical { .. })
        ));

        let log = handle.command_log();
        assert!(!log.iter().any(|c| c == "enable_offboard"));
        assert!(log.iter().any(|c| c == "land"));
        assert!(!handle.is_armed());
    }

    #[test]
    fn test_abort_keeps_armed_until_touchdown() {
        let config = ControlConfig {
            landing_timeout_secs: 0.2,
            ..fast_config()
        };
        let (mut control, handle, _tx) =
            setup_with(SimConfig::default(), config, SafetyThresholds::default());
        handle.fail_command("enable_offboard");
        handle.fail_command("land");

        assert!(control.initialize().is_err());
        assert!(!handle.command_log().iter().any(|c| c == "disarm"));
        assert!(handle.is_armed());
        assert!(handle.altitude_m() > 0.5);
    }

    #[test]
    fn test_altitude_ceiling_lands_immediately() {
        let (mut control, handle, _tx) = setup(SafetyThresholds::default());
        control.initialize().unwrap();
        handle.set_altitude(55.0);
        control.tick(Instant::now(), false);
        assert_eq!(control.mode(), FlightMode::EmergencyLanding);
        assert!(matches!(
            control.transitions().last().unwrap().cause,
            TransitionCause::SafetyCritical(ViolationReason::AltitudeEmergency { .. })
        ));
    }

    #[test]
    fn test_target_in_skipped_sample_delays_target_loss() {
        let thresholds = SafetyThresholds {
            target_lost_timeout_secs: 1.0,
            ..SafetyThresholds::default()
        };
        let (mut control, _handle, mut tx) = setup(thresholds);
        control.initialize().unwrap();
        let following = FlightMode::Offboard(OffboardMode::Following);

        let t0 = Instant::now();
        tx.publish(target_sample(t0, Intent::ZERO));
        control.tick(t0, false);
        assert_eq!(control.mode(), following);

        // 同一周期内: 有目标的消息被后到的无目标消息覆盖
        let t1 = t0 + Duration::from_millis(800);
        tx.publish(target_sample(t1, Intent::ZERO));
        tx.publish(no_target_sample(t1));
        control.tick(t1, false);
        assert_eq!(control.mode(), following);

        control.tick(t0 + Duration::from_millis(1500), false);
        assert_eq!(control.mode(), following);

        control.tick(t1 + Duration::from_millis(1100), false);
        assert_eq!(control.mode(), FlightMode::Offboard(OffboardMode::Hovering));
    }

    #[test]
    fn test_target_sample_starts_following() {
        let (mut control, handle, mut tx) = setup(SafetyThresholds::default());
        control.initialize().unwrap();

        let intent = Intent::new(0.0, -0.39375, 0.0, 0.196875);
        let now = Instant::now();
        tx.publish(target_sample(now, intent));
        control.tick(now, false);
        assert_eq!(control.mode(), FlightMode::Offboard(OffboardMode::Following));

        let sent = handle.last_velocity().unwrap();
        assert!((sent.right_m_s + 0.7875).abs() < 1e-5);
        assert!((sent.yaw_rate_deg_s - 8.859375).abs() < 1e-4);

        // 本周期无新数据: 保持跟随但发送零速度
        control.tick(now, false);
        assert_eq!(control.mode(), FlightMode::Offboard(OffboardMode::Following));
        assert!(handle.last_velocity().unwrap().is_hover());
    }

    #[test]
    fn test_failed_send_is_not_retried() {
        let (mut control, handle, mut tx) = setup(SafetyThresholds::default());
        control.initialize().unwrap();
        handle.fail_command("send_velocity");

        let now = Instant::now();
        tx.publish(target_sample(now, Intent::new(0.3, 0.0, 0.0, 0.0)));
        control.tick(now, false);
        assert_eq!(control.stats().command_failures, 1);

        let sends = |h: &VehicleHandle| {
            h.command_log()
                .iter()
                .filter(|c| *c == "send_velocity")
                .count()
        };
        let before = sends(&handle);
        handle.clear_failures();
        control.tick(now, false);
        assert_eq!(sends(&handle), before + 1);
    }

    #[test]
    fn test_critical_battery_lands_immediately() {
        let (mut control, handle, _tx) = setup(SafetyThresholds::default());
        control.initialize().unwrap();
        handle.set_battery(9.0);
        control.tick(Instant::now(), false);
        assert_eq!(control.mode(), FlightMode::EmergencyLanding);
        assert_eq!(handle.command_log().last().map(String::as_str), Some("land"));
    }

    #[test]
    fn test_telemetry_failure_returns_home() {
        let (mut control, handle, _tx) = setup(SafetyThresholds::default());
        control.initialize().unwrap();
        handle.fail_command("telemetry");
        control.tick(Instant::now(), false);
        assert_eq!(control.mode(), FlightMode::ReturningToLaunch);
        assert_eq!(control.stats().telemetry_failures, 1);
    }

    #[test]
    fn test_run_returns_home_and_disarms() {
        let (mut control, handle, _tx) = setup(SafetyThresholds::default());
        control.initialize().unwrap();
        let report = control.run(&ShutdownToken::new());

        assert_eq!(report.exit, TrackingExit::DurationElapsed);
        assert!(report.landed);
        assert_eq!(report.final_mode, FlightMode::Idle);
        assert!(!handle.is_armed());

        let modes: Vec<FlightMode> = report.transitions.iter().map(|t| t.to).collect();
        assert!(modes.ends_with(&[
            FlightMode::ReturningToLaunch,
            FlightMode::Landed,
            FlightMode::Idle
        ]));
    }

    #[test]
    fn test_shutdown_forces_return_to_launch() {
        let (mut control, _handle, _tx) = setup(SafetyThresholds::default());
        control.config.run_duration_secs = 60.0;
        control.initialize().unwrap();
        let shutdown = ShutdownToken::new();
        shutdown.trigger();
        let report = control.run(&shutdown);
        assert_eq!(report.exit, TrackingExit::Shutdown);
        assert!(report
            .transitions
            .iter()
            .any(|t| t.from.is_offboard() && t.to == FlightMode::ReturningToLaunch));
        assert!(report.landed);
    }
}
