//! 安全监控 (Safety monitor)
//!
//! 每个控制周期根据遥测 + 飞行时长 + 目标丢失时长重新计算一次判定,不跨周期缓存。
//! 判定顺序: 链路 → 飞行时长 → 电池 → 高度 → GPS → 目标丢失;
//! 按顺序短路判定: 第一个失败项即为本周期判定。
//! 遥测读取失败按 Critical 处理 (未知状态即不安全状态)。

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::flight::TelemetrySnapshot;

/// 严重程度 (Advisory < Warn < Critical)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// 仅提示: 不触发返航,但通知模式机切回悬停
    Advisory,
    Warn,
    Critical,
}

/// 违规原因
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum ViolationReason {
    TelemetryUnavailable,
    LinkLost,
    FlightTimeExceeded { elapsed_secs: f32 },
    BatteryCritical { remaining_pct: f32 },
    BatteryLow { remaining_pct: f32 },
    AltitudeEmergency { altitude_m: f32 },
    AltitudeOutOfRange { altitude_m: f32 },
    GpsLost { satellites: u32 },
    TargetLost { elapsed_secs: f32 },
}

impl ViolationReason {
    pub fn label(&self) -> &'static str {
        match self {
            ViolationReason::TelemetryUnavailable => "telemetry",
            ViolationReason::LinkLost => "link",
            ViolationReason::FlightTimeExceeded { .. } => "flight_time",
            ViolationReason::BatteryCritical { .. } | ViolationReason::BatteryLow { .. } => {
                "battery"
            }
            ViolationReason::AltitudeEmergency { .. }
            | ViolationReason::AltitudeOutOfRange { .. } => "altitude",
            ViolationReason::GpsLost { .. } => "gps",
            ViolationReason::TargetLost { .. } => "target_lost",
        }
    }

    /// 需要立即原地降落 (而不是返航)
    pub fn requires_immediate_descent(&self) -> bool {
        matches!(
            self,
            ViolationReason::BatteryCritical { .. }
                | ViolationReason::AltitudeEmergency { .. }
                | ViolationReason::GpsLost { .. }
        )
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationReason::TelemetryUnavailable => write!(f, "telemetry unavailable"),
            ViolationReason::LinkLost => write!(f, "flight controller disconnected"),
            ViolationReason::FlightTimeExceeded { elapsed_secs } => {
                write!(f, "maximum flight time exceeded ({elapsed_secs:.0}s)")
            }
            ViolationReason::BatteryCritical { remaining_pct } => {
                write!(f, "critical battery ({remaining_pct:.0}%)")
            }
            ViolationReason::BatteryLow { remaining_pct } => {
                write!(f, "low battery ({remaining_pct:.0}%)")
            }
            ViolationReason::AltitudeEmergency { altitude_m } => {
                write!(f, "emergency altitude ceiling exceeded ({altitude_m:.1}m)")
            }
            ViolationReason::AltitudeOutOfRange { altitude_m } => {
                write!(f, "altitude out of safe range ({altitude_m:.1}m)")
            }
            ViolationReason::GpsLost { satellites } => {
                write!(f, "GPS lock lost ({satellites} satellites)")
            }
            ViolationReason::TargetLost { elapsed_secs } => {
                write!(f, "target lost for {elapsed_secs:.1}s")
            }
        }
    }
}

/// 安全判定
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum SafetyVerdict {
    Ok,
    Violation {
        reason: ViolationReason,
        severity: Severity,
    },
}

impl SafetyVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, SafetyVerdict::Ok)
    }

    pub fn severity(&self) -> Option<Severity> {
        match self {
            SafetyVerdict::Ok => None,
            SafetyVerdict::Violation { severity, .. } => Some(*severity),
        }
    }

    pub fn reason(&self) -> Option<ViolationReason> {
        match self {
            SafetyVerdict::Ok => None,
            SafetyVerdict::Violation { reason, .. } => Some(*reason),
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity() == Some(Severity::Critical)
    }

    pub fn is_warn(&self) -> bool {
        self.severity() == Some(Severity::Warn)
    }

    /// Critical 且要求立即降落
    pub fn requires_immediate_descent(&self) -> bool {
        match self {
            SafetyVerdict::Violation {
                reason,
                severity: Severity::Critical,
            } => reason.requires_immediate_descent(),
            _ => false,
        }
    }

    pub fn is_target_lost(&self) -> bool {
        matches!(
            self,
            SafetyVerdict::Violation {
                reason: ViolationReason::TargetLost { .. },
                ..
            }
        )
    }
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyVerdict::Ok => write!(f, "ok"),
            SafetyVerdict::Violation { reason, severity } => write!(f, "{severity:?}: {reason}"),
        }
    }
}

/// 安全阈值
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyThresholds {
    pub max_flight_secs: f32,          // 最大飞行时间
    pub battery_warn_pct: f32,         // 低电量警告
    pub battery_critical_pct: f32,     // 电量危急
    pub altitude_min_m: f32,           // 安全高度下限
    pub altitude_max_m: f32,           // 安全高度上限
    pub altitude_emergency_m: f32,     // 紧急高度上限 (比上限更严格的硬限制)
    pub target_lost_timeout_secs: f32, // 目标丢失超时
    pub min_satellites: u32,           // GPS最少卫星数
    pub require_gps_fix: bool,
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            max_flight_secs: 600.0,
            battery_warn_pct: 20.0,
            battery_critical_pct: 10.0,
            altitude_min_m: 2.0,
            altitude_max_m: 30.0,
            altitude_emergency_m: 50.0,
            target_lost_timeout_secs: 5.0,
            min_satellites: 6,
            require_gps_fix: true,
        }
    }
}

impl SafetyThresholds {
    pub fn target_lost_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.target_lost_timeout_secs.max(0.0))
    }
}

/// 单周期判定输入
#[derive(Clone, Copy, Debug)]
pub struct SafetyInput<'a> {
    /// None 表示本周期遥测读取失败
    pub telemetry: Option<&'a TelemetrySnapshot>,
    pub flight_start: Option<Instant>,
    pub last_target_seen: Option<Instant>,
    pub now: Instant,
}

#[derive(Clone, Debug, Default)]
pub struct SafetyMonitor {
    thresholds: SafetyThresholds,
}

impl SafetyMonitor {
    pub fn new(thresholds: SafetyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SafetyThresholds {
        &self.thresholds
    }

    /// 计算本周期判定 (第一个失败项)
    pub fn evaluate(&self, input: &SafetyInput<'_>) -> SafetyVerdict {
        match self.violations(input).into_iter().next() {
            Some((reason, severity)) => SafetyVerdict::Violation { reason, severity },
            None => SafetyVerdict::Ok,
        }
    }

    /// 按判定顺序列出所有违规项
    pub fn violations(&self, input: &SafetyInput<'_>) -> Vec<(ViolationReason, Severity)> {
        let t = &self.thresholds;
        let mut found = Vec::new();

        // 1. 链路: 读取失败或断连时其余遥测项不可信
        let telemetry = match input.telemetry {
            None => {
                found.push((ViolationReason::TelemetryUnavailable, Severity::Critical));
                None
            }
            Some(snapshot) if !snapshot.connected => {
                found.push((ViolationReason::LinkLost, Severity::Critical));
                None
            }
            Some(snapshot) => Some(snapshot),
        };

        // 2. 飞行时长
        if let Some(start) = input.flight_start {
            let elapsed = input.now.saturating_duration_since(start).as_secs_f32();
            if elapsed > t.max_flight_secs {
                found.push((
                    ViolationReason::FlightTimeExceeded {
                        elapsed_secs: elapsed,
                    },
                    Severity::Critical,
                ));
            }
        }

        if let Some(snapshot) = telemetry {
            // 3. 电池
            let remaining_pct = snapshot.battery.remaining_pct;
            if remaining_pct < t.battery_critical_pct {
                found.push((
                    ViolationReason::BatteryCritical { remaining_pct },
                    Severity::Critical,
                ));
            } else if remaining_pct < t.battery_warn_pct {
                found.push((ViolationReason::BatteryLow { remaining_pct }, Severity::Warn));
            }

            // 4. 高度 (安全区间只在空中检查; 紧急上限始终检查)
            let altitude_m = snapshot.altitude_m();
            if altitude_m > t.altitude_emergency_m {
                found.push((
                    ViolationReason::AltitudeEmergency { altitude_m },
                    Severity::Critical,
                ));
            } else if snapshot.flying
                && (altitude_m < t.altitude_min_m || altitude_m > t.altitude_max_m)
            {
                found.push((
                    ViolationReason::AltitudeOutOfRange { altitude_m },
                    Severity::Warn,
                ));
            }

            // 5. GPS
            let gps = snapshot.gps;
            if gps.num_satellites < t.min_satellites || (t.require_gps_fix && !gps.has_fix) {
                found.push((
                    ViolationReason::GpsLost {
                        satellites: gps.num_satellites,
                    },
                    Severity::Critical,
                ));
            }
        }

        // 6. 目标丢失 (仅提示)
        if let Some(seen) = input.last_target_seen {
            let lost_for = input.now.saturating_duration_since(seen);
            if lost_for > t.target_lost_timeout() {
                found.push((
                    ViolationReason::TargetLost {
                        elapsed_secs: lost_for.as_secs_f32(),
                    },
                    Severity::Advisory,
                ));
            }
        }

        found
    }
}
