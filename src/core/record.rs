//! 会话评分与记录
//!
//! `score = round(100 × 已完成步骤 / 总步骤)`; 会话结束时组装 `SessionRecord`
//! 交给外部记录器

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 计算得分 (0-100)
pub fn score(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = completed.min(total) as f64 / total as f64;
    (100.0 * ratio).round() as u8
}

/// 已完成步骤条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedStep {
    #[serde(rename = "step")]
    pub step_id: String,
    /// 相对会话开始的完成时间 (毫秒)
    #[serde(rename = "completedAt")]
    pub completion_offset_ms: u64,
    /// 累计时长 (秒)
    #[serde(rename = "duration")]
    pub accumulated_duration: f64,
    #[serde(rename = "feedback")]
    pub feedback_text: String,
}

/// 会话指标
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    /// 平均每步用时 (毫秒) = 会话时长 / 已完成步骤数
    pub average_step_time: f64,
}

/// 会话记录 (定稿后不可变)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub task: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<CompletedStep>,
    pub score: u8,
    pub completed_steps: usize,
    pub total_steps: usize,
    /// 是否完成全部步骤 (false 表示中途放弃)
    pub finished: bool,
    pub metrics: SessionMetrics,
}

/// 会话进行中的完成日志
#[derive(Debug, Clone)]
pub struct SessionLog {
    session_id: String,
    user_id: String,
    task: String,
    start_time: DateTime<Utc>,
    total_steps: usize,
    entries: Vec<CompletedStep>,
}

impl SessionLog {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        task: impl Into<String>,
        start_time: DateTime<Utc>,
        total_steps: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            task: task.into(),
            start_time,
            total_steps,
            entries: Vec::with_capacity(total_steps),
        }
    }

    /// 记录一次 StepCompleted
    pub fn push(&mut self, entry: CompletedStep) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[CompletedStep] {
        &self.entries
    }

    /// 当前得分 (会话内单调不减)
    pub fn score(&self) -> u8 {
        score(self.entries.len(), self.total_steps)
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// 定稿
    pub fn finalize(&self, end_time: DateTime<Utc>, duration_ms: u64) -> SessionRecord {
        let completed = self.entries.len();
        let average_step_time = if completed == 0 {
            0.0
        } else {
            duration_ms as f64 / completed as f64
        };

        SessionRecord {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            task: self.task.clone(),
            start_time: self.start_time,
            end_time,
            duration_ms,
            steps: self.entries.clone(),
            score: self.score(),
            completed_steps: completed,
            total_steps: self.total_steps,
            finished: completed == self.total_steps,
            metrics: SessionMetrics { average_step_time },
        }
    }
}
