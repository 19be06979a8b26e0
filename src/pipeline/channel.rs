//! 感知 → 控制 跟踪通道 (Tracking channel)
//!
//! crossbeam 有界通道 + 丢弃最旧策略: 通道满时发送端自己取出最旧的一条再写入,
//! 因此生产者永不阻塞,消费者看到的数据陈旧度有上界。
//! 消费端只用 try_recv,控制线程永不等待感知线程。
//!
//! 发送端持有的接收端克隆会让底层通道一直保持连接,
//! 所以消费端是否已关闭由单独的标志记录。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::command::Intent;
use crate::detection::Target;

/// 通道消息: 每个感知周期一条,无论是否有目标
#[derive(Clone, Debug, PartialEq)]
pub struct TrackingSample {
    pub frame_id: u64,
    pub target: Option<Target>,
    pub intent: Intent, // 平滑后的意图
    pub timestamp: Instant,
}

impl TrackingSample {
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }
}

/// 发送结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Queued,
    /// 为腾出空间丢弃了若干条最旧消息
    DroppedOldest(usize),
    /// 消费端已关闭,消息未写入
    Disconnected,
}

/// 创建跟踪通道
pub fn tracking_channel(capacity: usize) -> (TrackingSender, TrackingReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let open = Arc::new(AtomicBool::new(true));
    let sender = TrackingSender {
        tx,
        evict: rx.clone(),
        receiver_open: open.clone(),
        dropped: 0,
    };
    let receiver = TrackingReceiver {
        rx,
        open,
        skipped: 0,
        last_target_seen: None,
    };
    (sender, receiver)
}

/// 生产端 (感知线程独占)
pub struct TrackingSender {
    tx: Sender<TrackingSample>,
    evict: Receiver<TrackingSample>, // 仅用于丢弃最旧消息
    receiver_open: Arc<AtomicBool>,
    dropped: u64,
}

impl TrackingSender {
    /// 写入一条消息; 通道满时丢弃最旧的消息
    pub fn publish(&mut self, sample: TrackingSample) -> PublishOutcome {
        if !self.receiver_open.load(Ordering::Acquire) {
            return PublishOutcome::Disconnected;
        }
        let mut pending = sample;
        let mut evicted = 0;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => {
                    self.dropped += evicted as u64;
                    return if evicted == 0 {
                        PublishOutcome::Queued
                    } else {
                        PublishOutcome::DroppedOldest(evicted)
                    };
                }
                // evict 保持通道连接,失败只可能是通道已满
                Err(full) => {
                    // 消费端可能恰好取走了数据,此时 try_recv 为空,直接重试
                    if self.evict.try_recv().is_ok() {
                        evicted += 1;
                    }
                    pending = full.into_inner();
                }
            }
        }
    }

    /// 累计丢弃条数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }
}

/// 消费端 (控制线程独占)
pub struct TrackingReceiver {
    rx: Receiver<TrackingSample>,
    open: Arc<AtomicBool>,
    skipped: u64,
    last_target_seen: Option<Instant>, // 已取出消息中最新的有目标时间戳
}

impl TrackingReceiver {
    /// 非阻塞取最新一条,较旧的消息被跳过; 无新数据返回 None
    pub fn latest(&mut self) -> Option<TrackingSample> {
        let mut newest = None;
        loop {
            match self.rx.try_recv() {
                Ok(sample) => {
                    self.note_target(&sample);
                    if newest.is_some() {
                        self.skipped += 1;
                    }
                    newest = Some(sample);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return newest,
            }
        }
    }

    /// 按从旧到新顺序取出全部消息
    pub fn drain(&mut self) -> Vec<TrackingSample> {
        let samples: Vec<TrackingSample> = self.rx.try_iter().collect();
        for sample in &samples {
            self.note_target(sample);
        }
        samples
    }

    /// 包括被跳过的消息在内,最近一次看到目标的时间
    pub fn last_target_seen(&self) -> Option<Instant> {
        self.last_target_seen
    }

    fn note_target(&mut self, sample: &TrackingSample) {
        if sample.has_target() && self.last_target_seen.map_or(true, |t| sample.timestamp > t) {
            self.last_target_seen = Some(sample.timestamp);
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// 因只取最新而跳过的条数
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl Drop for TrackingReceiver {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}
