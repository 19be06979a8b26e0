//! 运动意图与速度指令 (Intent & velocity command)
//! Intent 为无量纲归一化量, VelocityCommand 为裁剪到机体限制的物理量

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

// ========== 裁剪范围 ==========

pub const FORWARD_LIMIT: f32 = 0.5;
pub const LATERAL_LIMIT: f32 = 1.0;
pub const VERTICAL_LIMIT: f32 = 1.0;
pub const YAW_LIMIT: f32 = 0.5;

/// 归一化运动意图 {前进, 右移, 上升, 偏航}
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub forward: f32,
    pub right: f32,
    pub up: f32,
    pub yaw: f32,
}

impl Intent {
    /// 悬停意图
    pub const ZERO: Intent = Intent {
        forward: 0.0,
        right: 0.0,
        up: 0.0,
        yaw: 0.0,
    };

    pub fn new(forward: f32, right: f32, up: f32, yaw: f32) -> Self {
        Self {
            forward,
            right,
            up,
            yaw,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.components().iter().all(|c| *c == 0.0)
    }

    /// [forward, right, up, yaw]
    pub fn components(&self) -> [f32; 4] {
        [self.forward, self.right, self.up, self.yaw]
    }

    /// 逐分量变换
    pub fn map(self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            forward: f(self.forward),
            right: f(self.right),
            up: f(self.up),
            yaw: f(self.yaw),
        }
    }

    /// 裁剪到声明范围 (非有限值按0处理)
    pub fn clamped(self) -> Self {
        let clip = |v: f32, limit: f32| {
            if v.is_finite() {
                v.clamp(-limit, limit)
            } else {
                0.0
            }
        };
        Self {
            forward: clip(self.forward, FORWARD_LIMIT),
            right: clip(self.right, LATERAL_LIMIT),
            up: clip(self.up, VERTICAL_LIMIT),
            yaw: clip(self.yaw, YAW_LIMIT),
        }
    }

    pub fn within_limits(&self) -> bool {
        self.forward.abs() <= FORWARD_LIMIT
            && self.right.abs() <= LATERAL_LIMIT
            && self.up.abs() <= VERTICAL_LIMIT
            && self.yaw.abs() <= YAW_LIMIT
    }
}

/// 机体速度限制
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityLimits {
    pub max_velocity_m_s: f32,        // 最大线速度
    pub max_following_speed_m_s: f32, // 意图满量程对应的跟随速度
    pub max_yaw_rate_deg_s: f32,      // 最大偏航角速度
}

impl Default for VelocityLimits {
    fn default() -> Self {
        Self {
            max_velocity_m_s: 3.0,
            max_following_speed_m_s: 2.0,
            max_yaw_rate_deg_s: 45.0,
        }
    }
}

/// 机体系速度指令 (发送给飞控)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct VelocityCommand {
    pub forward_m_s: f32,
    pub right_m_s: f32,
    pub up_m_s: f32,
    pub yaw_rate_deg_s: f32,
}

impl VelocityCommand {
    pub const HOVER: VelocityCommand = VelocityCommand {
        forward_m_s: 0.0,
        right_m_s: 0.0,
        up_m_s: 0.0,
        yaw_rate_deg_s: 0.0,
    };

    /// 意图 → 物理量,并裁剪到机体限制
    pub fn from_intent(intent: &Intent, limits: &VelocityLimits) -> Self {
        let intent = intent.clamped();
        let v_max = limits.max_velocity_m_s.abs();
        let yaw_max = limits.max_yaw_rate_deg_s.abs();
        let speed = limits.max_following_speed_m_s;
        Self {
            forward_m_s: (intent.forward * speed).clamp(-v_max, v_max),
            right_m_s: (intent.right * speed).clamp(-v_max, v_max),
            up_m_s: (intent.up * speed).clamp(-v_max, v_max),
            yaw_rate_deg_s: (intent.yaw * yaw_max).clamp(-yaw_max, yaw_max),
        }
    }

    /// 飞控接口使用 rad/s
    pub fn yaw_rate_rad_s(&self) -> f32 {
        self.yaw_rate_deg_s.to_radians()
    }

    pub fn is_hover(&self) -> bool {
        *self == Self::HOVER
    }

    pub fn within(&self, limits: &VelocityLimits) -> bool {
        let v_max = limits.max_velocity_m_s.abs();
        self.forward_m_s.abs() <= v_max
            && self.right_m_s.abs() <= v_max
            && self.up_m_s.abs() <= v_max
            && self.yaw_rate_deg_s.abs() <= limits.max_yaw_rate_deg_s.abs()
    }
}

/// 已发送指令的短历史 (仅用于诊断)
#[derive(Clone, Debug)]
pub struct CommandHistory {
    entries: VecDeque<(Instant, VelocityCommand)>,
    capacity: usize,
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, at: Instant, command: VelocityCommand) {
        self.entries.push_back((at, command));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn last(&self) -> Option<&(Instant, VelocityCommand)> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Instant, VelocityCommand)> {
        self.entries.iter()
    }
}
