//! 训练事件
//!
//! 发给展示层 (UI / 语音), 每个事件都带足渲染所需的数据

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::coaching::StruggleContext;
use crate::core::record::SessionRecord;

/// 训练事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrainingEvent {
    /// 步骤完成
    StepCompleted {
        session_id: Uuid,
        step_id: String,
        label: String,
        index: usize,
        /// 会话累计时间 (秒)
        session_time: f64,
        accumulated_duration: f64,
        feedback: String,
        /// 完成后的得分
        score: u8,
    },
    /// 卡顿, 值得请求教练
    StruggleDetected {
        session_id: Uuid,
        context: StruggleContext,
    },
    /// 全部步骤完成
    SessionCompleted {
        session_id: Uuid,
        score: u8,
        record: SessionRecord,
    },
    /// 教练反馈到达 (步骤仍未完成)
    CoachingFeedback {
        session_id: Uuid,
        step_id: String,
        text: String,
    },
    /// 检测到当前步骤期望的物体 (仅提示)
    ObjectsDetected {
        session_id: Uuid,
        step_id: String,
        labels: Vec<String>,
    },
}

impl TrainingEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::StepCompleted { session_id, .. }
            | Self::StruggleDetected { session_id, .. }
            | Self::SessionCompleted { session_id, .. }
            | Self::CoachingFeedback { session_id, .. }
            | Self::ObjectsDetected { session_id, .. } => *session_id,
        }
    }

    /// 可直接显示 / 朗读的文本
    pub fn display_text(&self) -> String {
        match self {
            Self::StepCompleted { label, feedback, .. } => {
                if feedback.is_empty() {
                    format!("{} complete.", label)
                } else {
                    feedback.clone()
                }
            }
            Self::StruggleDetected { context, .. } => {
                format!("Having trouble with \"{}\"? Let's try again.", context.step_label)
            }
            Self::SessionCompleted { score, .. } => {
                format!("Session complete! Score: {}/100", score)
            }
            Self::CoachingFeedback { text, .. } => text.clone(),
            Self::ObjectsDetected { labels, .. } => format!("Detected: {}", labels.join(", ")),
        }
    }
}
