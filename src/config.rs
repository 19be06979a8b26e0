//! 跟随配置 - 通过JSON文件调整参数
//! 缺省值与原型系统一致;CLI参数在文件之上覆盖

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::command::{CommandConfig, SmoothingConfig, VelocityLimits};
use crate::detection::{FrameSize, SelectionConfig, DEFAULT_HISTORY_CAPACITY};
use crate::error::{PilotError, Result};
use crate::flight::ModeLimits;
use crate::safety::SafetyThresholds;

/// 感知参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub rate_hz: f64,            // 感知频率
    pub channel_capacity: usize, // 感知 → 控制通道容量
    pub history_capacity: usize, // 跟踪历史长度
    pub selection: SelectionConfig,
    pub command: CommandConfig,
    pub smoothing: SmoothingConfig,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        let frame = FrameSize::default();
        Self {
            frame_width: frame.width,
            frame_height: frame.height,
            rate_hz: 10.0,
            channel_capacity: 10,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            selection: SelectionConfig::default(),
            command: CommandConfig::default(),
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl PerceptionConfig {
    pub fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.frame_width, self.frame_height)
    }
}

/// 控制参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub rate_hz: f64,                 // 控制频率
    pub takeoff_altitude_m: f32,      // 起飞高度
    pub takeoff_complete_ratio: f32,  // 达到起飞高度的比例
    pub touchdown_altitude_m: f32,    // 着陆判定高度
    pub gps_timeout_secs: f32,        // GPS锁定等待超时
    pub takeoff_timeout_secs: f32,    // 起飞爬升等待超时
    pub landing_timeout_secs: f32,    // 返航/降落监督超时
    pub run_duration_secs: f32,       // 跟踪阶段时长
    pub status_interval_secs: f32,    // 状态报告间隔
    pub command_history: usize,       // 指令历史长度
    pub velocity: VelocityLimits,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            rate_hz: 20.0,
            takeoff_altitude_m: 5.0,
            takeoff_complete_ratio: 0.9,
            touchdown_altitude_m: 0.5,
            gps_timeout_secs: 60.0,
            takeoff_timeout_secs: 30.0,
            landing_timeout_secs: 120.0,
            run_duration_secs: 300.0,
            status_interval_secs: 1.0,
            command_history: 5,
            velocity: VelocityLimits::default(),
        }
    }
}

fn secs(value: f32) -> Duration {
    Duration::from_secs_f32(value.max(0.0))
}

impl ControlConfig {
    pub fn mode_limits(&self) -> ModeLimits {
        ModeLimits {
            takeoff_altitude_m: self.takeoff_altitude_m,
            takeoff_complete_ratio: self.takeoff_complete_ratio,
            touchdown_altitude_m: self.touchdown_altitude_m,
        }
    }

    pub fn gps_timeout(&self) -> Duration {
        secs(self.gps_timeout_secs)
    }

    pub fn takeoff_timeout(&self) -> Duration {
        secs(self.takeoff_timeout_secs)
    }

    pub fn landing_timeout(&self) -> Duration {
        secs(self.landing_timeout_secs)
    }

    pub fn run_duration(&self) -> Duration {
        secs(self.run_duration_secs)
    }

    pub fn status_interval(&self) -> Duration {
        secs(self.status_interval_secs)
    }
}

/// 完整配置
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    pub perception: PerceptionConfig,
    pub control: ControlConfig,
    pub safety: SafetyThresholds,
}

impl FollowConfig {
    /// 从JSON文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    error!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 检查参数是否自洽
    pub fn validate(&self) -> Result<()> {
        let p = &self.perception;
        let c = &self.control;
        let s = &self.safety;

        let invalid = |msg: &str| Err(PilotError::Config(msg.to_string()));

        if !(p.rate_hz > 0.0 && p.rate_hz.is_finite()) {
            return invalid("perception.rate_hz must be positive");
        }
        if !(c.rate_hz > 0.0 && c.rate_hz.is_finite()) {
            return invalid("control.rate_hz must be positive");
        }
        if p.channel_capacity == 0 || p.history_capacity == 0 || c.command_history == 0 {
            return invalid("capacities must be at least 1");
        }
        if p.frame_width == 0 || p.frame_height == 0 {
            return invalid("frame size must be non-zero");
        }
        if p.selection.min_person_size > p.selection.max_person_size {
            return invalid("selection.min_person_size exceeds max_person_size");
        }
        if !(0.0..=1.0).contains(&p.selection.min_confidence) {
            return invalid("selection.min_confidence must be within [0, 1]");
        }
        if c.takeoff_altitude_m <= 0.0 || !(0.0..=1.0).contains(&c.takeoff_complete_ratio) {
            return invalid("takeoff altitude/ratio out of range");
        }
        if c.velocity.max_velocity_m_s <= 0.0 || c.velocity.max_yaw_rate_deg_s <= 0.0 {
            return invalid("velocity limits must be positive");
        }
        if s.battery_critical_pct > s.battery_warn_pct {
            return invalid("safety.battery_critical_pct exceeds battery_warn_pct");
        }
        if s.altitude_min_m > s.altitude_max_m || s.altitude_max_m > s.altitude_emergency_m {
            return invalid("safety altitude thresholds must satisfy min <= max <= emergency");
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        let p = &self.perception;
        let c = &self.control;
        let s = &self.safety;
        info!("🎛️  当前跟随配置:");
        info!(
            "  感知: {}x{} @ {:.0}Hz | 通道容量 {} | 历史 {}",
            p.frame_width, p.frame_height, p.rate_hz, p.channel_capacity, p.history_capacity
        );
        info!(
            "  目标: 尺寸 {:.0}-{:.0}px (标称 {:.0}) | 置信度 ≥ {:.2} | 死区 {:.2} | 平滑 {:.2}",
            p.selection.min_person_size,
            p.selection.max_person_size,
            p.command.nominal_size,
            p.selection.min_confidence,
            p.command.deadzone,
            p.smoothing.factor
        );
        info!(
            "  控制: {:.0}Hz | 起飞高度 {:.1}m | 最大速度 {:.1}m/s | 最大偏航 {:.0}°/s | 运行 {:.0}s",
            c.rate_hz,
            c.takeoff_altitude_m,
            c.velocity.max_velocity_m_s,
            c.velocity.max_yaw_rate_deg_s,
            c.run_duration_secs
        );
        info!(
            "  安全: 最长飞行 {:.0}s | 电量 {:.0}%/{:.0}% | 高度 {:.0}-{:.0}m (紧急 {:.0}m) | 目标丢失 {:.1}s | 卫星 ≥ {}",
            s.max_flight_secs,
            s.battery_warn_pct,
            s.battery_critical_pct,
            s.altitude_min_m,
            s.altitude_max_m,
            s.altitude_emergency_m,
            s.target_lost_timeout_secs,
            s.min_satellites
        );
    }
}
