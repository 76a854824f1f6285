//! 手部关键点
//!
//! 每只手 21 个归一化 2D 关键点 (MediaPipe 手部模型编号)

use serde::{Deserialize, Serialize};

/// 每只手的关键点数量
pub const LANDMARK_COUNT: usize = 21;

/// 每帧最多手数
pub const MAX_HANDS: usize = 2;

/// 关键点编号
pub mod index {
    pub const WRIST: usize = 0;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_TIP: usize = 12;
    pub const RING_FINGER_TIP: usize = 16;
    pub const PINKY_TIP: usize = 20;

    /// 手掌参考点
    pub const PALM: usize = WRIST;

    /// 五个指尖
    pub const FINGERTIPS: [usize; 5] = [
        THUMB_TIP,
        INDEX_FINGER_TIP,
        MIDDLE_FINGER_TIP,
        RING_FINGER_TIP,
        PINKY_TIP,
    ];
}

/// 单个关键点 (归一化坐标, [0,1]×[0,1])
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 欧氏距离
    pub fn distance(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// 一帧中被跟踪的一只手 (捕获后不可变)
#[derive(Debug, Clone, PartialEq)]
pub struct HandSample {
    landmarks: [Landmark; LANDMARK_COUNT],
}

impl HandSample {
    pub fn new(landmarks: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { landmarks }
    }

    pub fn landmarks(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.landmarks
    }

    pub fn landmark(&self, idx: usize) -> Option<Landmark> {
        self.landmarks.get(idx).copied()
    }

    /// 手掌 (关键点 0)
    pub fn palm(&self) -> Landmark {
        self.landmarks[index::PALM]
    }

    /// 指尖 (关键点 4, 8, 12, 16, 20)
    pub fn fingertips(&self) -> [Landmark; 5] {
        index::FINGERTIPS.map(|i| self.landmarks[i])
    }
}

/// 一帧观测: 1 到 2 只手 + 捕获时间戳
#[derive(Debug, Clone, PartialEq)]
pub struct FrameObservation {
    hands: Vec<HandSample>,
    /// 时间戳 (秒, 单调)
    pub timestamp: f64,
}

impl FrameObservation {
    /// 超过 `MAX_HANDS` 的手会被截断
    pub fn new(mut hands: Vec<HandSample>, timestamp: f64) -> Self {
        hands.truncate(MAX_HANDS);
        Self { hands, timestamp }
    }

    pub fn hands(&self) -> &[HandSample] {
        &self.hands
    }

    pub fn hand_count(&self) -> usize {
        self.hands.len()
    }

    /// 主手 (跟踪器报告的第一只)
    pub fn primary(&self) -> Option<&HandSample> {
        self.hands.first()
    }

    /// 恰好两只手时返回 (第一只, 第二只)
    pub fn pair(&self) -> Option<(&HandSample, &HandSample)> {
        match self.hands.as_slice() {
            [a, b] => Some((a, b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand_at(x: f32, y: f32) -> HandSample {
        let mut lms = [Landmark::new(x, y); LANDMARK_COUNT];
        for (n, &tip) in index::FINGERTIPS.iter().enumerate() {
            lms[tip] = Landmark::new(x + 0.01 * n as f32, y - 0.1);
        }
        HandSample::new(lms)
    }

    #[test]
    fn test_palm_and_fingertips() {
        let hand = hand_at(0.5, 0.5);
        assert_eq!(hand.palm(), Landmark::new(0.5, 0.5));
        let tips = hand.fingertips();
        assert!((tips[4].x - 0.54).abs() < 1e-6);
        assert!((tips[0].y - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_observation_truncates_extra_hands() {
        let obs = FrameObservation::new(
            vec![hand_at(0.1, 0.1), hand_at(0.2, 0.2), hand_at(0.3, 0.3)],
            1.0,
        );
        assert_eq!(obs.hand_count(), 2);
        assert!(obs.pair().is_some());
    }

    #[test]
    fn test_pair_requires_two_hands() {
        let obs = FrameObservation::new(vec![hand_at(0.1, 0.1)], 0.0);
        assert!(obs.pair().is_none());
        assert_eq!(obs.primary().map(|h| h.palm()), Some(Landmark::new(0.1, 0.1)));
    }
}
