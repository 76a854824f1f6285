//! 动作模式检测器
//!
//! 每个检测器都是 `(当前帧, 运动历史) → bool` 的纯函数，
//! 少于所需手数或历史不足时直接返回 false，从不报错

use serde::{Deserialize, Serialize};

use crate::buffer::history::MotionHistory;
use crate::hand::landmark::FrameObservation;

/// 画圈检测所需历史长度
pub const CIRCULAR_MIN_HISTORY: usize = 20;
/// 画圈: 角度绝对值累计阈值 (弧度)
pub const CIRCULAR_ANGLE_THRESHOLD: f32 = 2.0;

/// 交叠: 指尖到对侧手掌的距离阈值
pub const OVERLAP_DISTANCE: f32 = 0.1;
/// 交叠: 至少多少个指尖靠近
pub const OVERLAP_MIN_FINGERTIPS: usize = 2;

/// 上下运动检测所需历史长度
pub const VERTICAL_MIN_HISTORY: usize = 15;
/// 垂直位移需超过水平位移的倍数
pub const VERTICAL_RATIO: f32 = 1.5;
/// 垂直位移绝对下限
pub const VERTICAL_FLOOR: f32 = 0.3;

/// 持续活动: 历史条目需超过此数 (约 1 秒 @ 30fps)
pub const SUSTAINED_MIN_HISTORY: usize = 30;

/// 检测器 (绑定到步骤)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detector {
    /// 至少一只手可见
    HandsVisible,
    /// 恰好两只手且手掌距离小于阈值
    HandsTogether { max_palm_distance: f32 },
    /// 主手画圈 (粗略的运动能量代理)
    CircularMotion,
    /// 第一只手的指尖压在第二只手掌上
    HandOverlap,
    /// 主手以垂直方向为主的运动
    VerticalMotion,
    /// 手持续被跟踪约 1 秒
    SustainedActivity,
}

impl Detector {
    /// 本帧是否观测到该模式
    pub fn observe(&self, current: Option<&FrameObservation>, history: &MotionHistory) -> bool {
        match *self {
            Detector::HandsVisible => hands_visible(current),
            Detector::HandsTogether { max_palm_distance } => {
                hands_together(current, max_palm_distance)
            }
            Detector::CircularMotion => circular_motion(history),
            Detector::HandOverlap => hand_overlap(current),
            Detector::VerticalMotion => vertical_motion(history),
            Detector::SustainedActivity => sustained_activity(history),
        }
    }

    /// 动作类型名 (发给教练服务)
    pub fn motion_type(&self) -> &'static str {
        match self {
            Detector::HandsVisible => "hands_visible",
            Detector::HandsTogether { .. } => "hands_together",
            Detector::CircularMotion => "circular_motion",
            Detector::HandOverlap => "hand_overlap",
            Detector::VerticalMotion => "vertical_motion",
            Detector::SustainedActivity => "sustained_activity",
        }
    }

    /// 参数是否有效
    pub fn threshold_valid(&self) -> bool {
        match *self {
            Detector::HandsTogether { max_palm_distance } => {
                max_palm_distance.is_finite() && max_palm_distance > 0.0
            }
            _ => true,
        }
    }
}

pub fn hands_visible(current: Option<&FrameObservation>) -> bool {
    current.map_or(false, |obs| obs.hand_count() > 0)
}

pub fn hands_together(current: Option<&FrameObservation>, max_palm_distance: f32) -> bool {
    current
        .and_then(|obs| obs.pair())
        .map_or(false, |(a, b)| a.palm().distance(&b.palm()) < max_palm_distance)
}

/// 累加最近相邻样本间主手位移方向 `atan2(Δy, Δx)` 的绝对值
///
/// 这不是曲率估计: 快速的来回运动同样会触发
pub fn circular_motion(history: &MotionHistory) -> bool {
    if history.len() < CIRCULAR_MIN_HISTORY {
        return false;
    }

    let palms: Vec<_> = history
        .recent(CIRCULAR_MIN_HISTORY)
        .into_iter()
        .filter_map(|obs| obs.primary().map(|h| h.palm()))
        .collect();

    let total: f32 = palms
        .windows(2)
        .map(|w| (w[1].y - w[0].y).atan2(w[1].x - w[0].x).abs())
        .sum();

    total > CIRCULAR_ANGLE_THRESHOLD
}

/// 只检查 第一只手指尖 → 第二只手掌 一个方向
pub fn hand_overlap(current: Option<&FrameObservation>) -> bool {
    let Some((first, second)) = current.and_then(|obs| obs.pair()) else {
        return false;
    };

    let palm = second.palm();
    let close = first
        .fingertips()
        .iter()
        .filter(|tip| tip.distance(&palm) < OVERLAP_DISTANCE)
        .count();

    close >= OVERLAP_MIN_FINGERTIPS
}

pub fn vertical_motion(history: &MotionHistory) -> bool {
    if history.len() < VERTICAL_MIN_HISTORY {
        return false;
    }

    let palms: Vec<_> = history
        .recent(VERTICAL_MIN_HISTORY)
        .into_iter()
        .filter_map(|obs| obs.primary().map(|h| h.palm()))
        .collect();

    let (vertical, horizontal) = palms.windows(2).fold((0.0f32, 0.0f32), |(v, h), w| {
        (v + (w[1].y - w[0].y).abs(), h + (w[1].x - w[0].x).abs())
    });

    vertical > horizontal * VERTICAL_RATIO && vertical > VERTICAL_FLOOR
}

pub fn sustained_activity(history: &MotionHistory) -> bool {
    history.len() > SUSTAINED_MIN_HISTORY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::landmark::{index, HandSample, Landmark, LANDMARK_COUNT};

    fn hand(x: f32, y: f32) -> HandSample {
        let mut lms = [Landmark::new(x, y); LANDMARK_COUNT];
        for (n, &tip) in index::FINGERTIPS.iter().enumerate() {
            lms[tip] = Landmark::new(x - 0.06 + 0.03 * n as f32, y - 0.15);
        }
        HandSample::new(lms)
    }

    fn one(x: f32, y: f32, t: f64) -> FrameObservation {
        FrameObservation::new(vec![hand(x, y)], t)
    }

    fn two(a: (f32, f32), b: (f32, f32)) -> FrameObservation {
        FrameObservation::new(vec![hand(a.0, a.1), hand(b.0, b.1)], 0.0)
    }

    fn history_of(points: &[(f32, f32)]) -> MotionHistory {
        let mut history = MotionHistory::new(100.0);
        for (i, &(x, y)) in points.iter().enumerate() {
            history.push(one(x, y, i as f64 / 30.0));
        }
        history
    }

    #[test]
    fn test_hands_visible() {
        assert!(!hands_visible(None));
        assert!(hands_visible(Some(&one(0.5, 0.5, 0.0))));
    }

    #[test]
    fn test_hands_together_thresholds() {
        let close = two((0.5, 0.5), (0.55, 0.5));
        assert!(hands_together(Some(&close), 0.15));
        assert!(hands_together(Some(&close), 0.12));

        let apart = two((0.5, 0.5), (0.63, 0.5));
        assert!(hands_together(Some(&apart), 0.15));
        assert!(!hands_together(Some(&apart), 0.12));

        // 单手永远为 false
        assert!(!hands_together(Some(&one(0.5, 0.5, 0.0)), 0.15));
    }

    #[test]
    fn test_circular_needs_history() {
        let circle: Vec<(f32, f32)> = (0..19)
            .map(|i| {
                let a = i as f32 * 0.6;
                (0.5 + 0.05 * a.cos(), 0.5 + 0.05 * a.sin())
            })
            .collect();
        assert!(!circular_motion(&history_of(&circle)));

        let mut longer = circle.clone();
        longer.push((0.5, 0.55));
        assert!(circular_motion(&history_of(&longer)));
    }

    #[test]
    fn test_circular_static_is_false() {
        let still = vec![(0.5, 0.5); 40];
        assert!(!circular_motion(&history_of(&still)));
    }

    #[test]
    fn test_circular_rightward_motion_is_false() {
        // 向右匀速移动: atan2(0, dx) = 0
        let line: Vec<(f32, f32)> = (0..30).map(|i| (0.1 + 0.01 * i as f32, 0.5)).collect();
        assert!(!circular_motion(&history_of(&line)));
    }

    #[test]
    fn test_circular_back_and_forth_false_positive() {
        // 来回抖动同样满足 (已知的误报模式)
        let jitter: Vec<(f32, f32)> = (0..25)
            .map(|i| (if i % 2 == 0 { 0.5 } else { 0.48 }, 0.5))
            .collect();
        assert!(circular_motion(&history_of(&jitter)));
    }

    #[test]
    fn test_hand_overlap_directional() {
        // 第二只手掌位于第一只手指尖附近
        let overlap = two((0.5, 0.6), (0.5, 0.46));
        assert!(hand_overlap(Some(&overlap)));

        // 交换顺序: 第一只手的指尖远离第二只手掌
        let swapped = two((0.5, 0.46), (0.5, 0.6));
        assert!(!hand_overlap(Some(&swapped)));

        assert!(!hand_overlap(Some(&one(0.5, 0.5, 0.0))));
        assert!(!hand_overlap(None));
    }

    #[test]
    fn test_vertical_motion() {
        let bob: Vec<(f32, f32)> = (0..15)
            .map(|i| (0.5, if i % 2 == 0 { 0.4 } else { 0.45 }))
            .collect();
        assert!(vertical_motion(&history_of(&bob)));

        // 位移太小, 低于绝对下限
        let small: Vec<(f32, f32)> = (0..15)
            .map(|i| (0.5, if i % 2 == 0 { 0.4 } else { 0.41 }))
            .collect();
        assert!(!vertical_motion(&history_of(&small)));

        // 对角运动: 垂直不足水平的 1.5 倍
        let diagonal: Vec<(f32, f32)> = (0..15)
            .map(|i| (0.1 + 0.04 * i as f32, 0.1 + 0.05 * i as f32))
            .collect();
        assert!(!vertical_motion(&history_of(&diagonal)));

        assert!(!vertical_motion(&history_of(&bob[..14])));
    }

    #[test]
    fn test_sustained_activity() {
        assert!(!sustained_activity(&history_of(&vec![(0.5, 0.5); 30])));
        assert!(sustained_activity(&history_of(&vec![(0.5, 0.5); 31])));
    }

    #[test]
    fn test_detector_serde() {
        let d: Detector =
            serde_json::from_str(r#"{"kind":"hands_together","max_palm_distance":0.12}"#).unwrap();
        assert_eq!(d, Detector::HandsTogether { max_palm_distance: 0.12 });
        assert_eq!(d.motion_type(), "hands_together");

        let d: Detector = serde_json::from_str(r#"{"kind":"circular_motion"}"#).unwrap();
        assert_eq!(d, Detector::CircularMotion);
    }
}
