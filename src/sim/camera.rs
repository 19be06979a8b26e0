//! 模拟相机与检测器 (Synthetic camera & detectors)

use std::collections::VecDeque;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detection::{Detection, Detector, Frame, FrameSize, FrameSource};
use crate::error::{PilotError, Result};

/// 合成帧来源: 只产生帧序号与尺寸,像素为空
pub struct SyntheticCamera {
    size: FrameSize,
    next_id: u64,
    dropout_every: Option<u64>, // 每N帧模拟一次采集失败
}

impl SyntheticCamera {
    pub fn new(size: FrameSize) -> Self {
        Self {
            size,
            next_id: 0,
            dropout_every: None,
        }
    }

    pub fn with_dropout(mut self, every: u64) -> Self {
        self.dropout_every = (every > 0).then_some(every);
        self
    }
}

impl FrameSource for SyntheticCamera {
    fn next_frame(&mut self) -> Result<Frame> {
        self.next_id += 1;
        if let Some(every) = self.dropout_every {
            if self.next_id % every == 0 {
                return Err(PilotError::Perception(format!(
                    "frame {} dropped",
                    self.next_id
                )));
            }
        }
        Ok(Frame::new(self.next_id, self.size, Instant::now()))
    }
}

/// 随机游走的行人 + 偶发漏检/干扰框 (固定种子可复现)
pub struct WanderingPersonDetector {
    rng: StdRng,
    cx: f32,
    cy: f32,
    extent: f32, // 人体框高度
    miss_probability: f64,
    distractor_probability: f64,
}

impl WanderingPersonDetector {
    pub fn new(seed: u64, frame: FrameSize) -> Self {
        let (cx, cy) = frame.center();
        Self {
            rng: StdRng::seed_from_u64(seed),
            cx,
            cy,
            extent: 200.0,
            miss_probability: 0.05,
            distractor_probability: 0.2,
        }
    }

    pub fn with_miss_probability(mut self, p: f64) -> Self {
        self.miss_probability = p.clamp(0.0, 1.0);
        self
    }

    fn wander(&mut self, frame: FrameSize) {
        let (w, h) = (frame.width as f32, frame.height as f32);
        self.cx = (self.cx + self.rng.gen_range(-12.0..12.0)).clamp(w * 0.1, w * 0.9);
        self.cy = (self.cy + self.rng.gen_range(-4.0..4.0)).clamp(h * 0.3, h * 0.7);
        self.extent = (self.extent + self.rng.gen_range(-6.0..6.0)).clamp(120.0, 320.0);
    }
}

impl Detector for WanderingPersonDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.wander(frame.size);

        let mut detections = Vec::new();
        if !self.rng.gen_bool(self.miss_probability) {
            let confidence = self.rng.gen_range(0.6..0.95);
            detections.push(Detection::from_center(
                self.cx,
                self.cy,
                self.extent * 0.45,
                self.extent,
                confidence,
            )?);
        }

        // 低置信度干扰框,应被置信度下限过滤
        if self.rng.gen_bool(self.distractor_probability) {
            let x = self.rng.gen_range(40.0..frame.size.width.max(81) as f32 - 40.0);
            let y = self.rng.gen_range(40.0..frame.size.height.max(81) as f32 - 40.0);
            let confidence = self.rng.gen_range(0.2..0.45);
            detections.push(Detection::from_center(x, y, 30.0, 60.0, confidence)?);
        }
        Ok(detections)
    }

    fn name(&self) -> &str {
        "wandering-person"
    }
}

/// 按脚本回放检测结果; 脚本结束后一直返回 `fallback`
pub struct ScriptedDetector {
    script: VecDeque<Vec<Detection>>,
    fallback: Vec<Detection>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
            fallback: Vec::new(),
        }
    }

    /// 前 `frames` 帧返回同一组检测,之后为空
    pub fn repeat(detections: Vec<Detection>, frames: usize) -> Self {
        Self::new(vec![detections; frames])
    }

    pub fn then_forever(mut self, detections: Vec<Detection>) -> Self {
        self.fallback = detections;
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::TargetSelector;

    #[test]
    fn test_camera_dropout() {
        let mut camera = SyntheticCamera::new(FrameSize::default()).with_dropout(3);
        let ok: Vec<bool> = (0..6).map(|_| camera.next_frame().is_ok()).collect();
        assert_eq!(ok, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn test_wandering_detector_is_reproducible() {
        let frame = Frame::new(1, FrameSize::default(), Instant::now());
        let mut a = WanderingPersonDetector::new(7, frame.size);
        let mut b = WanderingPersonDetector::new(7, frame.size);
        for _ in 0..50 {
            assert_eq!(a.detect(&frame).unwrap(), b.detect(&frame).unwrap());
        }
    }

    #[test]
    fn test_wandering_person_is_selected_over_distractors() {
        let frame = Frame::new(1, FrameSize::default(), Instant::now());
        let mut detector = WanderingPersonDetector::new(42, frame.size).with_miss_probability(0.0);
        let selector = TargetSelector::default();
        for _ in 0..100 {
            let detections = detector.detect(&frame).unwrap();
            let target = selector.select(&detections, frame.size).unwrap();
            assert!(target.detection.confidence() >= 0.6);
        }
    }

    #[test]
    fn test_scripted_replay() {
        let person = Detection::from_center(320.0, 240.0, 90.0, 200.0, 0.9).unwrap();
        let frame = Frame::new(1, FrameSize::default(), Instant::now());
        let mut detector = ScriptedDetector::repeat(vec![person.clone()], 2);
        assert_eq!(detector.detect(&frame).unwrap(), vec![person.clone()]);
        assert_eq!(detector.detect(&frame).unwrap(), vec![person]);
        assert_eq!(detector.remaining(), 0);
        assert!(detector.detect(&frame).unwrap().is_empty());
    }
}
