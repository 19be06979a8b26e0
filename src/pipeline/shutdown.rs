//! 停机信号与固定周期节拍 (Shutdown token & fixed-rate ticker)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 全局停机信号,显式传入各循环,每个周期开头检查一次
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// 固定周期节拍器; 落后时不追赶,直接从当前时刻重新排期
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub fn new(rate_hz: f64) -> Self {
        let rate_hz = if rate_hz.is_finite() && rate_hz > 0.0 {
            rate_hz
        } else {
            1.0
        };
        Self {
            period: Duration::from_secs_f64(1.0 / rate_hz),
            next: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 睡眠到下一个节拍,返回本节拍时刻 (第一次调用立即返回)
    pub fn wait(&mut self) -> Instant {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
        }
        let now = Instant::now();
        self.next += self.period;
        if self.next < now {
            self.next = now + self.period;
        }
        now
    }
}
