//! 关键点帧适配器
//!
//! 把跟踪器的原始结果 (0-2 组关键点, 可能残缺) 规范化为 `FrameObservation`

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::landmark::{FrameObservation, HandSample, Landmark, LANDMARK_COUNT, MAX_HANDS};

/// 原始关键点 (坐标可能缺失)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLandmark {
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    /// 深度, 引擎不使用
    #[serde(default)]
    pub z: Option<f32>,
}

impl RawLandmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x: Some(x), y: Some(y), z: None }
    }

    fn to_landmark(self) -> Option<Landmark> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Landmark::new(x, y)),
            _ => None,
        }
    }
}

/// 跟踪器回调的一帧结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrackerFrame {
    /// 单调时间戳 (毫秒)
    pub timestamp_ms: f64,
    /// 每只手一组关键点
    #[serde(default)]
    pub hands: Vec<Vec<RawLandmark>>,
}

impl RawTrackerFrame {
    pub fn new(timestamp_ms: f64, hands: Vec<Vec<RawLandmark>>) -> Self {
        Self { timestamp_ms, hands }
    }

    pub fn empty(timestamp_ms: f64) -> Self {
        Self { timestamp_ms, hands: Vec::new() }
    }

    /// 时间戳 (秒)
    pub fn timestamp(&self) -> f64 {
        self.timestamp_ms / 1000.0
    }
}

/// 帧适配器 (无状态, 不触碰历史)
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameAdapter;

impl FrameAdapter {
    /// 没有任何有效手时返回 `None`
    pub fn adapt(raw: &RawTrackerFrame) -> Option<FrameObservation> {
        let hands: Vec<HandSample> = raw
            .hands
            .iter()
            .filter_map(|lms| Self::adapt_hand(lms))
            .take(MAX_HANDS)
            .collect();

        if hands.len() < raw.hands.len().min(MAX_HANDS) {
            debug!(
                "丢弃残缺的手: 原始 {} 只, 有效 {} 只",
                raw.hands.len(),
                hands.len()
            );
        }

        if hands.is_empty() {
            return None;
        }

        Some(FrameObservation::new(hands, raw.timestamp()))
    }

    /// 少于 21 个点或任一坐标缺失即视为无效
    fn adapt_hand(raw: &[RawLandmark]) -> Option<HandSample> {
        if raw.len() < LANDMARK_COUNT {
            return None;
        }

        let mut landmarks = [Landmark::default(); LANDMARK_COUNT];
        for (slot, lm) in landmarks.iter_mut().zip(raw.iter()) {
            *slot = lm.to_landmark()?;
        }

        Some(HandSample::new(landmarks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_hand(x: f32, y: f32) -> Vec<RawLandmark> {
        vec![RawLandmark::new(x, y); LANDMARK_COUNT]
    }

    #[test]
    fn test_no_hands() {
        assert!(FrameAdapter::adapt(&RawTrackerFrame::empty(10.0)).is_none());
    }

    #[test]
    fn test_short_hand_rejected() {
        let raw = RawTrackerFrame::new(0.0, vec![vec![RawLandmark::new(0.5, 0.5); 20]]);
        assert!(FrameAdapter::adapt(&raw).is_none());
    }

    #[test]
    fn test_missing_coordinate_rejected() {
        let mut hand = full_hand(0.5, 0.5);
        hand[7].y = None;
        let raw = RawTrackerFrame::new(0.0, vec![hand, full_hand(0.2, 0.2)]);

        // 残缺的手被丢弃, 另一只仍然保留
        let obs = FrameAdapter::adapt(&raw).unwrap();
        assert_eq!(obs.hand_count(), 1);
        assert_eq!(obs.primary().unwrap().palm(), Landmark::new(0.2, 0.2));
    }

    #[test]
    fn test_timestamp_converted_to_seconds() {
        let raw = RawTrackerFrame::new(1500.0, vec![full_hand(0.5, 0.5), full_hand(0.6, 0.5)]);
        let obs = FrameAdapter::adapt(&raw).unwrap();
        assert_eq!(obs.hand_count(), 2);
        assert!((obs.timestamp - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_json_frame() {
        let json = r#"{"timestamp_ms": 33.0, "hands": [[{"x": 0.1, "y": 0.2, "z": -0.01}]]}"#;
        let raw: RawTrackerFrame = serde_json::from_str(json).unwrap();
        assert_eq!(raw.hands.len(), 1);
        assert_eq!(raw.hands[0][0].x, Some(0.1));
        // 只有 1 个点, 无效
        assert!(FrameAdapter::adapt(&raw).is_none());
    }
}
