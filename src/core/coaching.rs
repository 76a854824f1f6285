//! 教练触发策略
//!
//! 两个独立的节流计数:
//! - 步骤级: `StepRuntimeState::hint_issued`, 每步至多一次
//! - 会话级: `CoachingBudget`, 由策略的调用方持有

use serde::{Deserialize, Serialize};

use crate::config::StepDefinition;
use crate::core::progress::StepRuntimeState;

/// 本设计中尝试次数固定为 1
pub const ATTEMPT_COUNT: u32 = 1;

/// 卡顿上下文 (转发给教练服务)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StruggleContext {
    pub step_id: String,
    pub step_label: String,
    /// 在该步骤上投入的时长 (秒)
    pub elapsed: f64,
    pub attempts: u32,
    pub motion_type: String,
}

/// 教练触发策略: 只判断"此处是否值得提示"
#[derive(Debug, Clone, Copy)]
pub struct CoachingPolicy {
    factor: f64,
}

impl CoachingPolicy {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }

    /// 投入时长超过 `factor × 所需时长` 且尚未提示时触发一次
    ///
    /// 在任何外部调用之前就置位 `hint_issued`
    pub fn evaluate(
        &self,
        def: &StepDefinition,
        state: &mut StepRuntimeState,
    ) -> Option<StruggleContext> {
        if state.completed || state.hint_issued {
            return None;
        }
        if state.engaged_duration <= def.required_duration * self.factor {
            return None;
        }

        state.hint_issued = true;

        Some(StruggleContext {
            step_id: def.id.clone(),
            step_label: def.label.clone(),
            elapsed: state.engaged_duration,
            attempts: ATTEMPT_COUNT,
            motion_type: def.detector.motion_type().to_string(),
        })
    }
}

impl Default for CoachingPolicy {
    fn default() -> Self {
        Self::new(2.0)
    }
}

/// 会话级教练调用预算
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoachingBudget {
    cap: u32,
    used: u32,
}

impl CoachingBudget {
    pub fn new(cap: u32) -> Self {
        Self { cap, used: 0 }
    }

    /// 还有额度时占用一次并返回 true
    pub fn try_acquire(&mut self) -> bool {
        if self.used >= self.cap {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.cap.saturating_sub(self.used)
    }
}
