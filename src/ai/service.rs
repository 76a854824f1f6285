//! 外部协作服务接口
//!
//! 检测、教练、记录三种能力, 由 `TrainingSession` 在 tokio 任务中调用。
//! HTTP 实现见 `client.rs`, 这里提供离线实现

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::types::CoachRequest;
use crate::config::Protocol;
use crate::core::fusion::DetectedObject;
use crate::core::record::SessionRecord;
use crate::error::CollaboratorError;

/// 物体检测 (输入 JPEG)
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(&self, jpeg: Bytes) -> Result<Vec<DetectedObject>, CollaboratorError>;
}

/// 教练服务
#[async_trait]
pub trait CoachingService: Send + Sync {
    async fn coach(&self, request: &CoachRequest) -> Result<String, CollaboratorError>;
}

/// 会话记录持久化
#[async_trait]
pub trait SessionRecorder: Send + Sync {
    async fn record(&self, record: &SessionRecord) -> Result<(), CollaboratorError>;
}

/// 基于规则的离线教练
pub struct RuleBasedCoach {
    /// 步骤 id → 默认反馈
    feedback: HashMap<String, String>,
}

impl RuleBasedCoach {
    const FALLBACK: &'static str = "Keep up the good work!";

    pub fn new(protocol: &Protocol) -> Self {
        let feedback = protocol
            .steps()
            .iter()
            .filter(|s| !s.feedback.is_empty())
            .map(|s| (s.id.clone(), s.feedback.clone()))
            .collect();
        Self { feedback }
    }

    fn motion_hint(motion_type: &str) -> Option<&'static str> {
        match motion_type {
            "hands_visible" => Some("Hold both hands up in front of the camera."),
            "hands_together" => Some("Bring your palms close together and keep rubbing."),
            "circular_motion" => Some("Rub your palms against each other in small circles."),
            "hand_overlap" => Some("Lace your fingers through each other."),
            "vertical_motion" => Some("Move your hands up and down under the water."),
            "sustained_activity" => Some("Keep your hands moving for a little longer."),
            _ => None,
        }
    }

    /// 同步生成反馈 (无需 runtime)
    pub fn feedback_for(&self, request: &CoachRequest) -> String {
        let base = self
            .feedback
            .get(&request.current_step)
            .map(String::as_str)
            .unwrap_or(Self::FALLBACK);

        match Self::motion_hint(&request.motion_type) {
            Some(hint) => format!("{} {}", hint, base),
            None => base.to_string(),
        }
    }
}

#[async_trait]
impl CoachingService for RuleBasedCoach {
    async fn coach(&self, request: &CoachRequest) -> Result<String, CollaboratorError> {
        let text = self.feedback_for(request);
        debug!("Rule-based feedback for {}: {}", request.current_step, text);
        Ok(text)
    }
}

/// 内存记录器 (测试与演示)
#[derive(Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<SessionRecord>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl SessionRecorder for MemoryRecorder {
    async fn record(&self, record: &SessionRecord) -> Result<(), CollaboratorError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// 写入目录下的 `<session_id>.json`
pub struct JsonFileRecorder {
    dir: PathBuf,
}

impl JsonFileRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }
}

#[async_trait]
impl SessionRecorder for JsonFileRecorder {
    async fn record(&self, record: &SessionRecord) -> Result<(), CollaboratorError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&record.session_id);
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, json).await?;
        info!("Session record written to {}", path.display());
        Ok(())
    }
}
