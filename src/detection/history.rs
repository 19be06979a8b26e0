//! 跟踪历史 (Tracking history)
//! Bounded FIFO of per-cycle observations, used for smoothing and target-loss timing

use std::collections::VecDeque;
use std::time::Instant;

use super::types::Target;

/// 默认历史长度
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// 单周期观测记录 (无目标时 center/size 为 None)
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub timestamp: Instant,
    pub center: Option<(f32, f32)>,
    pub size: Option<(f32, f32)>,
}

impl HistoryEntry {
    pub fn has_target(&self) -> bool {
        self.center.is_some()
    }
}

/// 固定容量的跟踪历史,超出容量时淘汰最旧记录
#[derive(Clone, Debug)]
pub struct TrackingHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl TrackingHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 记录本周期观测 (每周期调用一次)
    pub fn record(&mut self, timestamp: Instant, target: Option<&Target>) {
        let entry = HistoryEntry {
            timestamp,
            center: target.map(Target::center),
            size: target.map(Target::size),
        };
        self.entries.push_back(entry);

        // 限制历史长度
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 最近一次看到目标的时间
    pub fn last_seen(&self) -> Option<Instant> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.has_target())
            .map(|e| e.timestamp)
    }

    /// 从旧到新遍历
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for TrackingHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
