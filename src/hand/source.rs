//! 关键点来源
//!
//! 手部跟踪器本身是外部黑盒, 这里只定义"产生关键点帧"的能力接口,
//! 以及两个实现: 合成脚本 (演示 / 测试) 和 JSON 行回放

use std::f32::consts::PI;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use super::adapter::{RawLandmark, RawTrackerFrame};
use super::landmark::{index, LANDMARK_COUNT};

/// 关键点帧来源
pub trait LandmarkSource {
    /// 下一帧, 流结束时返回 `None`
    fn next_frame(&mut self) -> Option<RawTrackerFrame>;
}

/// 以手掌为基准合成一只手: 指尖在手掌上方 0.15 处横向展开
pub fn synthetic_hand(palm_x: f32, palm_y: f32) -> Vec<RawLandmark> {
    const SPREAD: [f32; 5] = [-0.06, -0.03, 0.0, 0.03, 0.06];

    let mut hand = vec![RawLandmark::new(palm_x, palm_y); LANDMARK_COUNT];
    for (finger, &tip) in index::FINGERTIPS.iter().enumerate() {
        let tip_x = palm_x + SPREAD[finger];
        let tip_y = palm_y - 0.15;
        // 每根手指 4 个点, 从根部线性插值到指尖
        for joint in 0..4 {
            let t = (joint + 1) as f32 / 4.0;
            hand[tip - 3 + joint] = RawLandmark::new(
                palm_x + (tip_x - palm_x) * t,
                palm_y + (tip_y - palm_y) * t,
            );
        }
    }
    hand
}

/// 合成动作
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Motion {
    /// 无手
    Absent,
    /// 单手静止
    OneHandStill,
    /// 双手静止, 手掌相距 `gap`
    TwoHandsStill { gap: f32 },
    /// 主手画圈
    Circle { radius: f32, period: f32 },
    /// 第二只手手掌压在主手指尖上
    Interlaced,
    /// 主手上下摆动
    Vertical { amplitude: f32, period: f32 },
}

impl Motion {
    fn hands_at(&self, t: f32) -> Vec<Vec<RawLandmark>> {
        const CX: f32 = 0.45;
        const CY: f32 = 0.6;

        match *self {
            Motion::Absent => Vec::new(),
            Motion::OneHandStill => vec![synthetic_hand(CX, CY)],
            Motion::TwoHandsStill { gap } => {
                vec![synthetic_hand(CX, CY), synthetic_hand(CX + gap, CY)]
            }
            Motion::Circle { radius, period } => {
                let phase = 2.0 * PI * t / period;
                let x = CX + radius * phase.cos();
                let y = CY + radius * phase.sin();
                vec![synthetic_hand(x, y), synthetic_hand(CX + 0.05, CY)]
            }
            Motion::Interlaced => {
                vec![synthetic_hand(CX, CY), synthetic_hand(CX, CY - 0.14)]
            }
            Motion::Vertical { amplitude, period } => {
                let y = CY + amplitude * (2.0 * PI * t / period).sin();
                vec![synthetic_hand(CX, y), synthetic_hand(CX + 0.05, y)]
            }
        }
    }
}

/// 按时间段播放的合成脚本
pub struct ScriptedSource {
    /// (动作, 持续秒数)
    script: Vec<(Motion, f32)>,
    fps: f32,
    frame: u64,
}

impl ScriptedSource {
    pub fn new(script: Vec<(Motion, f32)>, fps: f32) -> Self {
        Self {
            script,
            fps: fps.max(1.0),
            frame: 0,
        }
    }

    /// 覆盖默认七步洗手流程的完整脚本
    pub fn hand_washing(fps: f32) -> Self {
        Self::new(
            vec![
                (Motion::OneHandStill, 2.0),
                (Motion::TwoHandsStill { gap: 0.05 }, 3.0),
                (Motion::Circle { radius: 0.05, period: 1.0 }, 4.0),
                (Motion::Interlaced, 4.0),
                (Motion::TwoHandsStill { gap: 0.05 }, 4.0),
                (Motion::TwoHandsStill { gap: 0.08 }, 3.0),
                (Motion::Vertical { amplitude: 0.15, period: 0.6 }, 4.0),
            ],
            fps,
        )
    }

    /// 脚本总时长 (秒)
    pub fn duration(&self) -> f32 {
        self.script.iter().map(|(_, d)| d).sum()
    }

    fn motion_at(&self, t: f32) -> Option<(Motion, f32)> {
        let mut start = 0.0;
        for &(motion, duration) in &self.script {
            if t < start + duration {
                return Some((motion, t - start));
            }
            start += duration;
        }
        None
    }
}

impl LandmarkSource for ScriptedSource {
    fn next_frame(&mut self) -> Option<RawTrackerFrame> {
        let t = self.frame as f32 / self.fps;
        let (motion, local) = self.motion_at(t)?;
        self.frame += 1;

        Some(RawTrackerFrame::new(
            t as f64 * 1000.0,
            motion.hands_at(local),
        ))
    }
}

/// JSON 行回放: 每行一个 `RawTrackerFrame`
pub struct ReplaySource {
    lines: std::io::Lines<BufReader<File>>,
    line_no: usize,
}

impl ReplaySource {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

impl LandmarkSource for ReplaySource {
    fn next_frame(&mut self) -> Option<RawTrackerFrame> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    warn!("Replay read failed: {}", e);
                    return None;
                }
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str(&line) {
                Ok(frame) => return Some(frame),
                Err(e) => warn!("Skipping malformed replay line {}: {}", self.line_no, e),
            }
        }
    }
}
