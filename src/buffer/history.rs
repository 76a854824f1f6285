//! 运动历史缓冲区
//!
//! 按时间窗口裁剪的观测环形缓冲区，供需要时间上下文的检测器使用

use std::collections::VecDeque;

use crate::hand::landmark::FrameObservation;

/// 预分配容量上限 (条目数)
const MAX_CAPACITY_HINT: usize = 4096;

/// 运动历史
///
/// 不变量: 所有条目满足 `newest - entry.timestamp < window`
#[derive(Debug, Clone)]
pub struct MotionHistory {
    entries: VecDeque<FrameObservation>,
    /// 窗口长度 (秒)
    window: f64,
}

impl MotionHistory {
    /// 创建历史缓冲区
    ///
    /// # Arguments
    /// * `window` - 窗口长度 (秒), 例如 2.0 ≈ 60 帧 @ 30fps
    pub fn new(window: f64) -> Self {
        Self {
            entries: VecDeque::with_capacity(Self::capacity_hint(window)),
            window,
        }
    }

    /// 按 30fps 预估容量, 上限 `MAX_CAPACITY_HINT`
    fn capacity_hint(window: f64) -> usize {
        if window.is_finite() {
            (window * 30.0).clamp(1.0, MAX_CAPACITY_HINT as f64) as usize + 1
        } else {
            MAX_CAPACITY_HINT
        }
    }

    /// 追加观测并淘汰过期条目
    pub fn push(&mut self, observation: FrameObservation) {
        self.prune(observation.timestamp);
        self.entries.push_back(observation);
    }

    /// 淘汰 `now - timestamp >= window` 的条目 (从最旧开始)
    ///
    /// 时间戳回退时, 比 `now` 更新的条目也一并清除
    pub fn prune(&mut self, now: f64) {
        while let Some(front) = self.entries.front() {
            let age = now - front.timestamp;
            if age >= self.window || age.is_nan() {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        while let Some(back) = self.entries.back() {
            if back.timestamp > now {
                self.entries.pop_back();
            } else {
                break;
            }
        }
    }

    /// 最近的至多 `n` 个条目, 按时间顺序
    pub fn recent(&self, n: usize) -> Vec<&FrameObservation> {
        let start = self.entries.len().saturating_sub(n);
        self.entries.range(start..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    /// 时间范围
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let first = self.entries.front()?.timestamp;
        let last = self.entries.back()?.timestamp;
        Some((first, last))
    }
}

impl Default for MotionHistory {
    fn default() -> Self {
        Self::new(2.0)
    }
}
