//! 步骤推进状态机
//!
//! 步骤严格按顺序完成: 只有第一个未完成的步骤会运行其检测器，
//! 完成后永不回退

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::history::MotionHistory;
use crate::config::Protocol;
use crate::hand::landmark::FrameObservation;

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
}

/// 每个会话、每个步骤的运行时状态
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepRuntimeState {
    /// 检测器为真时累计的时长 (秒), 只增不减, 完成后冻结
    pub(crate) accumulated_duration: f64,
    /// 步骤处于激活状态且画面中有手的时长 (秒)
    pub(crate) engaged_duration: f64,
    pub(crate) completed: bool,
    /// 本步骤是否已经发出过教练提示
    pub(crate) hint_issued: bool,
}

impl StepRuntimeState {
    pub fn accumulated_duration(&self) -> f64 {
        self.accumulated_duration
    }

    pub fn engaged_duration(&self) -> f64 {
        self.engaged_duration
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn hint_issued(&self) -> bool {
        self.hint_issued
    }
}

/// 单帧推进结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepAdvance {
    /// 被评估的步骤
    pub index: usize,
    /// 本帧检测器是否为真
    pub observed: bool,
    /// 本帧是否刚刚完成
    pub completed: bool,
}

/// 步骤推进状态机
#[derive(Debug, Clone)]
pub struct StepMachine {
    states: Vec<StepRuntimeState>,
}

impl StepMachine {
    pub fn new(step_count: usize) -> Self {
        Self {
            states: vec![StepRuntimeState::default(); step_count],
        }
    }

    /// 第一个未完成的步骤
    pub fn active_index(&self) -> Option<usize> {
        self.states.iter().position(|s| !s.completed)
    }

    /// 是第一个未完成步骤, 且 (是步骤 0 或前一步已完成)
    pub fn is_eligible(&self, index: usize) -> bool {
        self.active_index() == Some(index)
            && (index == 0 || self.states.get(index - 1).map_or(false, |s| s.completed))
    }

    /// 推进一帧
    ///
    /// `dt` 为距上次评估的实际时间; 当前帧无手时不累计任何时长。
    /// 全部完成后返回 `None`
    pub fn advance(
        &mut self,
        protocol: &Protocol,
        dt: f64,
        current: Option<&FrameObservation>,
        history: &MotionHistory,
    ) -> Option<StepAdvance> {
        let index = self.active_index()?;
        if !self.is_eligible(index) {
            return None;
        }
        let def = protocol.get(index)?;
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        let state = &mut self.states[index];
        if current.is_none() {
            return Some(StepAdvance { index, observed: false, completed: false });
        }

        state.engaged_duration += dt;

        let observed = def.detector.observe(current, history);
        if observed {
            state.accumulated_duration += dt;
            if state.accumulated_duration >= def.required_duration {
                state.completed = true;
                debug!(
                    "步骤 {} 达到所需时长: {:.2}s / {:.2}s",
                    def.id, state.accumulated_duration, def.required_duration
                );
            }
        }

        Some(StepAdvance { index, observed, completed: state.completed })
    }

    pub fn status(&self, index: usize) -> Option<StepStatus> {
        let state = self.states.get(index)?;
        Some(if state.completed {
            StepStatus::Completed
        } else if self.is_eligible(index) {
            StepStatus::Active
        } else {
            StepStatus::Pending
        })
    }

    pub fn state(&self, index: usize) -> Option<&StepRuntimeState> {
        self.states.get(index)
    }

    pub(crate) fn state_mut(&mut self, index: usize) -> Option<&mut StepRuntimeState> {
        self.states.get_mut(index)
    }

    pub fn states(&self) -> &[StepRuntimeState] {
        &self.states
    }

    pub fn completed_count(&self) -> usize {
        self.states.iter().filter(|s| s.completed).count()
    }

    pub fn is_finished(&self) -> bool {
        !self.states.is_empty() && self.states.iter().all(|s| s.completed)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
