//! 端到端任务场景: 模拟飞行器 + 脚本/随机检测器

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use follow_drone_rs::flight::{FlightMode, OffboardMode, Transition, TransitionCause};
use follow_drone_rs::pipeline::TrackingExit;
use follow_drone_rs::safety::ViolationReason;
use follow_drone_rs::sim::{
    ScriptedDetector, SimConfig, SimulatedVehicle, SyntheticCamera, VehicleHandle,
    WanderingPersonDetector,
};
use follow_drone_rs::{
    run_mission, Detection, FollowConfig, Frame, FrameSource, PilotError, ShutdownToken,
    TransitionJournal,
};

const FOLLOWING: FlightMode = FlightMode::Offboard(OffboardMode::Following);
const HOVERING: FlightMode = FlightMode::Offboard(OffboardMode::Hovering);

fn fast_config(run_secs: f32) -> FollowConfig {
    let mut config = FollowConfig::default();
    config.perception.rate_hz = 100.0;
    config.control.rate_hz = 200.0;
    config.control.run_duration_secs = run_secs;
    config.control.takeoff_timeout_secs = 10.0;
    config.control.landing_timeout_secs = 10.0;
    config.control.status_interval_secs = 0.2;
    config.safety.target_lost_timeout_secs = 0.3;
    config
}

fn vehicle() -> (SimulatedVehicle, VehicleHandle) {
    let vehicle = SimulatedVehicle::new(SimConfig::default());
    let handle = vehicle.handle();
    (vehicle, handle)
}

fn camera(config: &FollowConfig) -> SyntheticCamera {
    SyntheticCamera::new(config.perception.frame_size())
}

fn person(cx: f32) -> Detection {
    Detection::from_center(cx, 240.0, 90.0, 200.0, 0.9).unwrap()
}

/// 统计采集次数的相机
struct CountingCamera {
    inner: SyntheticCamera,
    frames: Arc<AtomicU64>,
}

impl FrameSource for CountingCamera {
    fn next_frame(&mut self) -> follow_drone_rs::Result<Frame> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        self.inner.next_frame()
    }
}

fn wait_for_offboard(handle: &VehicleHandle) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while handle.snapshot().vehicle_mode != "OFFBOARD" && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
}

/// 在另一个线程中等待飞行器进入Offboard后执行操作
fn once_offboard(handle: &VehicleHandle, delay: Duration, action: impl FnOnce() + Send + 'static) {
    let handle = handle.clone();
    thread::spawn(move || {
        wait_for_offboard(&handle);
        thread::sleep(delay);
        action();
    });
}

fn has_transition(transitions: &[Transition], from: FlightMode, to: FlightMode) -> bool {
    transitions.iter().any(|t| t.from == from && t.to == to)
}

#[test]
fn follows_person_then_returns_home() {
    let dir = tempfile::tempdir().unwrap();
    let journal_path = dir.path().join("drone_following.log");

    let config = fast_config(0.6);
    let (vehicle, handle) = vehicle();
    let detector =
        WanderingPersonDetector::new(3, config.perception.frame_size()).with_miss_probability(0.0);

    let summary = run_mission(
        &config,
        vehicle,
        camera(&config),
        detector,
        TransitionJournal::open(&journal_path).unwrap(),
        &ShutdownToken::new(),
    )
    .unwrap();

    let report = &summary.control;
    assert_eq!(report.exit, TrackingExit::DurationElapsed);
    assert!(report.landed);
    assert_eq!(report.final_mode, FlightMode::Idle);
    assert!(has_transition(&report.transitions, HOVERING, FOLLOWING));
    assert!(report.stats.commands_sent > 0);
    assert!(summary.perception.frames_with_target > 0);
    assert!(!handle.is_armed());

    // 启动顺序
    let log = handle.command_log();
    let order: Vec<usize> = ["connect", "wait_for_lock", "arm", "takeoff", "enable_offboard"]
        .iter()
        .map(|cmd| log.iter().position(|c| c == cmd).unwrap())
        .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]));

    // 每次模式切换都有一行带时间戳的记录
    let content = fs::read_to_string(&journal_path).unwrap();
    let modes: Vec<serde_json::Value> = content
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
        .filter(|v| v["event"] == "mode")
        .collect();
    assert_eq!(modes.len(), report.transitions.len());
    assert!(modes.iter().all(|v| v["timestamp"].is_string()));
    assert!(modes.iter().any(|v| v["to"] == "ReturningToLaunch"));
    assert_eq!(modes.last().unwrap()["to"], "Idle");
}

#[test]
fn critical_battery_triggers_emergency_landing() {
    let config = fast_config(10.0);
    let (vehicle, handle) = vehicle();
    let detector = ScriptedDetector::new(Vec::new()).then_forever(vec![person(420.0)]);

    let injector = handle.clone();
    once_offboard(&handle, Duration::from_millis(150), move || injector.set_battery(9.0));

    let summary = run_mission(
        &config,
        vehicle,
        camera(&config),
        detector,
        TransitionJournal::disabled(),
        &ShutdownToken::new(),
    )
    .unwrap();

    let report = &summary.control;
    assert_eq!(report.exit, TrackingExit::SafetyRecovery);
    let emergency = report
        .transitions
        .iter()
        .find(|t| t.to == FlightMode::EmergencyLanding)
        .expect("emergency landing transition");
    assert!(emergency.from.is_offboard());
    assert!(matches!(
        emergency.cause,
        TransitionCause::SafetyCritical(ViolationReason::BatteryCritical { .. })
    ));
    assert!(!has_transition(
        &report.transitions,
        FOLLOWING,
        FlightMode::ReturningToLaunch
    ));
    assert!(report.landed);
    assert!(handle.command_log().iter().any(|c| c == "land"));
}

#[test]
fn lost_target_reverts_to_hovering() {
    let config = fast_config(1.5);
    let (vehicle, handle) = vehicle();
    // 约0.3s可见,之后画面中没有人
    let detector = ScriptedDetector::repeat(vec![person(480.0)], 30);

    let summary = run_mission(
        &config,
        vehicle,
        camera(&config),
        detector,
        TransitionJournal::disabled(),
        &ShutdownToken::new(),
    )
    .unwrap();

    let report = &summary.control;
    let lost = report
        .transitions
        .iter()
        .find(|t| t.from == FOLLOWING && t.to == HOVERING)
        .expect("following → hovering transition");
    assert_eq!(lost.cause, TransitionCause::TargetLost);

    // 悬停后只发送零速度,直到返航
    assert!(handle.last_velocity().unwrap().is_hover());
    assert!(report.landed);
}

#[test]
fn missing_gps_aborts_before_arming() {
    let config = fast_config(1.0);
    let (vehicle, handle) = vehicle();
    handle.set_satellites(3);

    let result = run_mission(
        &config,
        vehicle,
        camera(&config),
        ScriptedDetector::new(Vec::new()),
        TransitionJournal::disabled(),
        &ShutdownToken::new(),
    );

    assert!(matches!(result, Err(PilotError::Initialization(_))));
    assert!(!handle.command_log().iter().any(|c| c == "arm"));
    assert!(!handle.is_armed());
}

#[test]
fn shutdown_signal_forces_return_to_launch() {
    let config = fast_config(60.0);
    let (vehicle, handle) = vehicle();
    let shutdown = ShutdownToken::new();

    let trigger = shutdown.clone();
    once_offboard(&handle, Duration::from_millis(100), move || trigger.trigger());

    let summary = run_mission(
        &config,
        vehicle,
        camera(&config),
        ScriptedDetector::new(Vec::new()).then_forever(vec![person(320.0)]),
        TransitionJournal::disabled(),
        &shutdown,
    )
    .unwrap();

    let report = &summary.control;
    assert_eq!(report.exit, TrackingExit::Shutdown);
    let rtl = report
        .transitions
        .iter()
        .find(|t| t.to == FlightMode::ReturningToLaunch)
        .expect("return to launch transition");
    assert!(rtl.from.is_offboard());
    assert_eq!(rtl.cause, TransitionCause::StopRequested);
    assert!(report.landed);
    assert!(!handle.is_armed());
}

#[test]
fn link_loss_returns_home_and_reports_unfinished_landing() {
    let mut config = fast_config(10.0);
    config.control.landing_timeout_secs = 0.3;
    let (vehicle, handle) = vehicle();

    let injector = handle.clone();
    once_offboard(&handle, Duration::from_millis(100), move || injector.set_link(false));

    let summary = run_mission(
        &config,
        vehicle,
        camera(&config),
        ScriptedDetector::new(Vec::new()),
        TransitionJournal::disabled(),
        &ShutdownToken::new(),
    )
    .unwrap();

    let report = &summary.control;
    assert_eq!(report.exit, TrackingExit::SafetyRecovery);
    assert!(report.transitions.iter().any(|t| {
        t.to == FlightMode::ReturningToLaunch
            && t.cause == TransitionCause::SafetyCritical(ViolationReason::LinkLost)
    }));
    // 链路断开后无法确认着陆
    assert!(!report.landed);
    assert_eq!(report.final_mode, FlightMode::ReturningToLaunch);
}

#[test]
fn gps_loss_in_flight_lands_in_place() {
    let config = fast_config(10.0);
    let (vehicle, handle) = vehicle();

    let injector = handle.clone();
    once_offboard(&handle, Duration::from_millis(100), move || injector.set_gps_fix(false));

    let summary = run_mission(
        &config,
        vehicle,
        camera(&config),
        ScriptedDetector::new(Vec::new()).then_forever(vec![person(320.0)]),
        TransitionJournal::disabled(),
        &ShutdownToken::new(),
    )
    .unwrap();

    let report = &summary.control;
    assert_eq!(report.exit, TrackingExit::SafetyRecovery);
    let emergency = report
        .transitions
        .iter()
        .find(|t| t.to == FlightMode::EmergencyLanding)
        .expect("emergency landing transition");
    assert!(emergency.from.is_offboard());
    assert!(matches!(
        emergency.cause,
        TransitionCause::SafetyCritical(ViolationReason::GpsLost { .. })
    ));
    assert!(!report
        .transitions
        .iter()
        .any(|t| t.to == FlightMode::ReturningToLaunch));
    assert!(report.landed);
    assert!(!handle.is_armed());
}

#[test]
fn shutdown_stops_perception_before_landing_completes() {
    let config = fast_config(60.0);
    // 慢速下降,保证检查时仍在空中
    let vehicle = SimulatedVehicle::new(SimConfig {
        rtl_descent_m_s: 0.3,
        ..SimConfig::default()
    });
    let handle = vehicle.handle();
    let frames = Arc::new(AtomicU64::new(0));
    let camera = CountingCamera {
        inner: camera(&config),
        frames: frames.clone(),
    };
    let shutdown = ShutdownToken::new();

    let watcher = {
        let (handle, frames, trigger) = (handle.clone(), frames.clone(), shutdown.clone());
        thread::spawn(move || {
            wait_for_offboard(&handle);
            thread::sleep(Duration::from_millis(100));
            trigger.trigger();
            thread::sleep(Duration::from_millis(50));
            let after_stop = frames.load(Ordering::SeqCst);
            thread::sleep(Duration::from_millis(200));
            (after_stop, frames.load(Ordering::SeqCst), handle.is_armed())
        })
    };

    let summary = run_mission(
        &config,
        vehicle,
        camera,
        ScriptedDetector::new(Vec::new()).then_forever(vec![person(320.0)]),
        TransitionJournal::disabled(),
        &shutdown,
    )
    .unwrap();
    let (after_stop, later, still_airborne) = watcher.join().unwrap();

    assert!(after_stop > 0);
    assert_eq!(after_stop, later);
    assert!(still_airborne);
    assert_eq!(summary.perception.cycles, later);
    assert_eq!(summary.control.exit, TrackingExit::Shutdown);
    assert!(summary.control.landed);
}
