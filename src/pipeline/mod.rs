/// 跟踪流水线 (Tracking Pipeline)
///
/// 双线程架构,只通过一个有界跟踪通道通信:
/// - Perception: 采集 + 检测 + 选目标 + 意图 (独立线程,默认 10Hz)
/// - Control:    安全判定 + 模式机 + 飞控指令 (调用线程,默认 20Hz)
///
/// 两个循环互不等待; 停机信号在每个周期开头检查。
pub mod channel;
pub mod control;
pub mod journal;
pub mod perception;
pub mod shutdown;

use std::thread;

use tracing::info;

pub use channel::{
    tracking_channel, PublishOutcome, TrackingReceiver, TrackingSample, TrackingSender,
};
pub use control::{ControlLoop, ControlReport, ControlStats, TrackingExit};
pub use journal::{TransitionJournal, DEFAULT_JOURNAL_PATH};
pub use perception::{PerceptionLoop, PerceptionStats};
pub use shutdown::{ShutdownToken, Ticker};

use crate::config::FollowConfig;
use crate::detection::{Detector, FrameSource};
use crate::error::{PilotError, Result};
use crate::flight::FlightActuator;

// ========== 任务运行 ==========

/// 一次完整任务的结果
#[derive(Clone, Debug)]
pub struct MissionSummary {
    pub control: ControlReport,
    pub perception: PerceptionStats,
}

/// 运行一次完整任务: 启动 → 跟随 → 返航/降落
///
/// 启动失败直接返回 `Initialization` 错误,感知线程不会启动。
/// 控制循环在调用线程上运行,感知循环在独立线程上运行。
pub fn run_mission<A, S, D>(
    config: &FollowConfig,
    actuator: A,
    source: S,
    detector: D,
    journal: TransitionJournal,
    shutdown: &ShutdownToken,
) -> Result<MissionSummary>
where
    A: FlightActuator,
    S: FrameSource + 'static,
    D: Detector + 'static,
{
    config.validate()?;

    let (tx, rx) = tracking_channel(config.perception.channel_capacity);
    let mut control = ControlLoop::new(
        config.control.clone(),
        config.safety.clone(),
        actuator,
        rx,
        journal,
    );
    control.initialize()?;

    // 感知线程在全局停机信号或控制循环结束时停止
    let finished = ShutdownToken::new();
    let mut perception = PerceptionLoop::new(&config.perception, source, detector, tx);
    let (perception_shutdown, perception_finished) = (shutdown.clone(), finished.clone());
    let handle = thread::Builder::new()
        .name("perception".into())
        .spawn(move || perception.run(&perception_shutdown, &perception_finished))?;

    let report = control.run(shutdown);

    finished.trigger();
    let perception_stats = handle
        .join()
        .map_err(|_| PilotError::Perception("perception thread panicked".into()))?;

    info!(
        "🏁 任务结束: {:?} | 最终模式 {} | 控制周期 {} | 指令 {} (失败 {}) | 感知周期 {}",
        report.exit,
        report.final_mode,
        report.stats.ticks,
        report.stats.commands_sent,
        report.stats.command_failures,
        perception_stats.cycles
    );

    Ok(MissionSummary {
        control: report,
        perception: perception_stats,
    })
}
