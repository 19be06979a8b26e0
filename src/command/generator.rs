//! 指令生成 (Command generation)
//! 目标在画面中的位置/大小 → 归一化运动意图
//!
//! 注意: 尺寸→距离的映射 (nominal_size / person_size) 是未标定的粗略近似

use serde::{Deserialize, Serialize};

use super::intent::{Intent, FORWARD_LIMIT, LATERAL_LIMIT, VERTICAL_LIMIT, YAW_LIMIT};
use crate::detection::{FrameSize, Target};

/// 指令生成参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub nominal_size: f32, // 期望的目标像素尺寸
    pub deadzone: f32,     // 死区阈值,抑制中心附近的检测噪声
    pub yaw_gain: f32,     // 水平偏移 → 偏航的增益
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            nominal_size: 200.0,
            deadzone: 0.1,
            yaw_gain: 0.5,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CommandGenerator {
    config: CommandConfig,
}

impl CommandGenerator {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    /// 无目标 → 零向量 (悬停意图)
    pub fn generate(&self, target: Option<&Target>, frame: FrameSize) -> Intent {
        let Some(target) = target else {
            return Intent::ZERO;
        };

        let (cx, cy) = target.center();
        let (frame_cx, frame_cy) = frame.center();

        // 归一化偏移 (-1 ~ 1)
        let half_w = (frame.width as f32 / 2.0).max(1.0);
        let half_h = (frame.height as f32 / 2.0).max(1.0);
        let x_offset = (cx - frame_cx) / half_w;
        let y_offset = (cy - frame_cy) / half_h;

        // 尺寸越小距离越远 (反比关系),防止零面积框除零
        let (w, h) = target.size();
        let person_size = w.max(h).max(1.0);
        let distance_ratio = self.config.nominal_size / person_size;

        let raw = Intent {
            forward: (distance_ratio - 1.0).clamp(-FORWARD_LIMIT, FORWARD_LIMIT),
            right: (-x_offset).clamp(-LATERAL_LIMIT, LATERAL_LIMIT),
            up: (-y_offset).clamp(-VERTICAL_LIMIT, VERTICAL_LIMIT),
            yaw: (x_offset * self.config.yaw_gain).clamp(-YAW_LIMIT, YAW_LIMIT),
        };

        self.apply_deadzone(raw)
    }

    /// 绝对值小于死区的分量强制为0
    pub fn apply_deadzone(&self, intent: Intent) -> Intent {
        let deadzone = self.config.deadzone;
        intent.map(|v| if v.abs() < deadzone { 0.0 } else { v })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;
    use proptest::prelude::*;

    fn target(cx: f32, cy: f32, w: f32, h: f32) -> Target {
        Target {
            detection: Detection::from_center(cx, cy, w, h, 0.9).unwrap(),
            score: 0.0,
        }
    }

    #[test]
    fn test_no_target_is_hover() {
        let gen = CommandGenerator::default();
        assert_eq!(gen.generate(None, FrameSize::default()), Intent::ZERO);
    }

    #[test]
    fn test_centered_nominal_is_zero() {
        let gen = CommandGenerator::default();
        let intent = gen.generate(Some(&target(320.0, 240.0, 200.0, 200.0)), FrameSize::default());
        assert_eq!(intent, Intent::ZERO);
    }

    #[test]
    fn test_offset_right_of_center() {
        let gen = CommandGenerator::default();
        let intent = gen.generate(Some(&target(500.0, 240.0, 200.0, 200.0)), FrameSize::default());
        assert!((intent.right + 0.5625).abs() < 1e-6);
        assert!((intent.yaw - 0.28125).abs() < 1e-6);
        assert_eq!(intent.forward, 0.0);
        assert_eq!(intent.up, 0.0);
    }

    #[test]
    fn test_forward_follows_apparent_size() {
        let gen = CommandGenerator::default();
        let frame = FrameSize::default();
        // 目标太小 (远) → 前进,上限0.5
        let far = gen.generate(Some(&target(320.0, 240.0, 40.0, 80.0)), frame);
        assert_eq!(far.forward, 0.5);
        // 目标太大 (近) → 后退
        let near = gen.generate(Some(&target(320.0, 240.0, 300.0, 400.0)), frame);
        assert!((near.forward + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_size_does_not_panic() {
        let gen = CommandGenerator::default();
        let tiny = target(320.0, 240.0, 0.01, 0.01);
        let intent = gen.generate(Some(&tiny), FrameSize::new(0, 0));
        assert!(intent.within_limits());
        assert!(intent.components().iter().all(|c| c.is_finite()));
    }

    proptest! {
        #[test]
        fn prop_pure_and_bounded(
            cx in -200.0f32..900.0, cy in -200.0f32..700.0,
            w in 0.5f32..800.0, h in 0.5f32..800.0,
        ) {
            let gen = CommandGenerator::default();
            let t = target(cx, cy, w, h);
            let frame = FrameSize::default();
            let a = gen.generate(Some(&t), frame);
            let b = gen.generate(Some(&t), frame);
            prop_assert_eq!(a, b);
            prop_assert!(a.within_limits());
        }

        #[test]
        fn prop_deadzone_zeroes_small_components(
            f in -0.5f32..0.5, r in -1.0f32..1.0, u in -1.0f32..1.0, y in -0.5f32..0.5,
        ) {
            let gen = CommandGenerator::default();
            let raw = Intent::new(f, r, u, y);
            let out = gen.apply_deadzone(raw);
            for (raw_c, out_c) in raw.components().iter().zip(out.components()) {
                if raw_c.abs() < 0.1 {
                    prop_assert_eq!(out_c, 0.0);
                } else {
                    prop_assert_eq!(out_c, *raw_c);
                }
            }
        }
    }
}
