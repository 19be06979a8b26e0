//! 感知线程 (Perception loop)
//! 职责: 采集帧 → 检测 → 选目标 → 生成意图 → 平滑 → 写入跟踪通道
//!
//! 采集/检测失败只影响当前周期 (视为无目标),循环不退出。

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::channel::{PublishOutcome, TrackingSample, TrackingSender};
use super::shutdown::{ShutdownToken, Ticker};
use crate::command::{CommandGenerator, TemporalSmoother};
use crate::config::PerceptionConfig;
use crate::detection::{
    Detection, Detector, FrameSize, FrameSource, TargetSelector, TrackingHistory,
};

/// 感知统计
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PerceptionStats {
    pub cycles: u64,
    pub frames_with_target: u64,
    pub perception_failures: u64,
    pub samples_dropped: u64,
    pub current_fps: f64,
}

pub struct PerceptionLoop<S, D> {
    source: S,
    detector: D,
    selector: TargetSelector,
    generator: CommandGenerator,
    smoother: TemporalSmoother,
    history: TrackingHistory,
    tx: TrackingSender,
    frame_size: FrameSize, // 最近一帧的尺寸 (采集失败时沿用)
    rate_hz: f64,

    // 统计
    stats: PerceptionStats,
    count: u64,
    last: Instant,
}

impl<S: FrameSource, D: Detector> PerceptionLoop<S, D> {
    pub fn new(config: &PerceptionConfig, source: S, detector: D, tx: TrackingSender) -> Self {
        Self {
            source,
            detector,
            selector: TargetSelector::new(config.selection.clone()),
            generator: CommandGenerator::new(config.command.clone()),
            smoother: TemporalSmoother::new(config.smoothing.clone()),
            history: TrackingHistory::new(config.history_capacity),
            tx,
            frame_size: config.frame_size(),
            rate_hz: config.rate_hz,
            stats: PerceptionStats::default(),
            count: 0,
            last: Instant::now(),
        }
    }

    pub fn stats(&self) -> &PerceptionStats {
        &self.stats
    }

    pub fn history(&self) -> &TrackingHistory {
        &self.history
    }

    /// 单个感知周期,返回已发布的消息
    pub fn cycle(&mut self, now: Instant) -> TrackingSample {
        self.stats.cycles += 1;
        let (frame_id, detections) = self.perceive();

        let target = self.selector.select(&detections, self.frame_size);
        self.history.record(now, target.as_ref());

        let raw = self.generator.generate(target.as_ref(), self.frame_size);
        let intent = self.smoother.smooth(raw, &self.history);

        if target.is_some() {
            self.stats.frames_with_target += 1;
        }

        let sample = TrackingSample {
            frame_id,
            target,
            intent,
            timestamp: now,
        };
        match self.tx.publish(sample.clone()) {
            PublishOutcome::DroppedOldest(n) => {
                self.stats.samples_dropped += n as u64;
                debug!("⏭️  控制端未及时消费,丢弃 {} 条旧数据", n);
            }
            PublishOutcome::Disconnected => debug!("跟踪通道已关闭"),
            PublishOutcome::Queued => {}
        }
        sample
    }

    /// 采集 + 检测; 失败时返回空检测列表
    fn perceive(&mut self) -> (u64, Vec<Detection>) {
        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.perception_failures += 1;
                warn!("⚠️  获取帧失败: {}", e);
                return (0, Vec::new());
            }
        };
        self.frame_size = frame.size;

        match self.detector.detect(&frame) {
            Ok(detections) => (frame.frame_id, detections),
            Err(e) => {
                self.stats.perception_failures += 1;
                warn!(
                    "⚠️  {} 检测失败 (帧 {}): {}",
                    self.detector.name(),
                    frame.frame_id,
                    e
                );
                (frame.frame_id, Vec::new())
            }
        }
    }

    /// 按固定频率运行,直到全局停机信号或任务结束信号任一触发
    pub fn run(&mut self, shutdown: &ShutdownToken, finished: &ShutdownToken) -> PerceptionStats {
        info!(
            "🔍 感知线程启动: {} @ {:.0}Hz",
            self.detector.name(),
            self.rate_hz
        );
        let mut ticker = Ticker::new(self.rate_hz);
        self.last = Instant::now();

        loop {
            if shutdown.is_triggered() {
                info!("🛑 感知线程收到停机信号");
                break;
            }
            if finished.is_triggered() {
                break;
            }
            let now = ticker.wait();
            self.cycle(now);
            self.update_fps();
        }

        info!(
            "🛑 感知线程退出: {} 周期, {} 帧有目标, {} 次失败",
            self.stats.cycles, self.stats.frames_with_target, self.stats.perception_failures
        );
        self.stats.clone()
    }

    fn update_fps(&mut self) {
        self.count += 1;
        let elapsed = self.last.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.stats.current_fps = self.count as f64 / elapsed.as_secs_f64();
            debug!(
                "📷 感知 FPS: {:.1} | 丢弃: {}",
                self.stats.current_fps,
                self.tx.dropped()
            );
            self.count = 0;
            self.last = Instant::now();
        }
    }
}
