//! 自主跟随飞行 (模拟后端)
//! Autonomous person following against the simulated vehicle and camera
//!
//! 主程序入口 - 直接运行: cargo run --bin follow --release

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use follow_drone_rs::pipeline::DEFAULT_JOURNAL_PATH;
use follow_drone_rs::sim::{SimConfig, SimulatedVehicle, SyntheticCamera, WanderingPersonDetector};
use follow_drone_rs::{run_mission, FollowConfig, ShutdownToken, TransitionJournal};

/// 自主跟随程序
#[derive(Parser, Debug)]
#[command(author, version, about = "无人机自主跟随 (模拟)", long_about = None)]
struct Args {
    /// 配置文件 (不存在时写入默认配置)
    #[arg(short, long, default_value = "follow_config.json")]
    config: String,

    /// 安全事件日志 (追加写入)
    #[arg(short, long, default_value = DEFAULT_JOURNAL_PATH)]
    journal: String,

    /// 跟踪阶段时长 (秒),覆盖配置文件
    #[arg(short, long)]
    duration: Option<f32>,

    /// 感知频率 (Hz),覆盖配置文件
    #[arg(long)]
    perception_hz: Option<f64>,

    /// 控制频率 (Hz),覆盖配置文件
    #[arg(long)]
    control_hz: Option<f64>,

    /// 模拟行人的随机种子
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// 每次遥测读取推进的模拟时间 (秒)
    #[arg(long, default_value_t = 0.05)]
    sim_step: f32,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ 无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("❌ 无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("🛑 收到 Ctrl+C"),
        _ = terminate => info!("🛑 收到 SIGTERM"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = FollowConfig::load(&args.config);
    if let Some(duration) = args.duration {
        config.control.run_duration_secs = duration;
    }
    if let Some(hz) = args.perception_hz {
        config.perception.rate_hz = hz;
    }
    if let Some(hz) = args.control_hz {
        config.control.rate_hz = hz;
    }
    config.validate().context("invalid configuration")?;
    config.print_summary();

    let journal = TransitionJournal::open(&args.journal)
        .with_context(|| format!("failed to open journal {}", args.journal))?;
    info!("📝 安全事件日志: {}", args.journal);

    let frame = config.perception.frame_size();
    let vehicle = SimulatedVehicle::new(SimConfig {
        step_secs: args.sim_step,
        ..SimConfig::default()
    });
    let camera = SyntheticCamera::new(frame);
    let detector = WanderingPersonDetector::new(args.seed, frame);
    info!("🎲 模拟行人种子: {} | 模拟步长: {:.3}s", args.seed, args.sim_step);

    // 控制/感知循环是阻塞线程; 异步运行时只负责信号
    let shutdown = ShutdownToken::new();
    let mission_shutdown = shutdown.clone();
    let mut mission = tokio::task::spawn_blocking(move || {
        run_mission(&config, vehicle, camera, detector, journal, &mission_shutdown)
    });

    let joined = tokio::select! {
        joined = &mut mission => joined,
        _ = shutdown_signal() => {
            shutdown.trigger();
            warn!("⏳ 等待返航降落完成...");
            mission.await
        }
    };

    let summary = joined
        .context("mission task panicked")?
        .context("mission aborted")?;

    if !summary.control.landed {
        bail!(
            "vehicle did not finish landing (final mode {})",
            summary.control.final_mode
        );
    }
    info!(
        "✅ 完成: {:?}, 感知 {} 周期 ({} 帧有目标)",
        summary.control.exit, summary.perception.cycles, summary.perception.frames_with_target
    );
    Ok(())
}
