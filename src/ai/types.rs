//! 后端服务的请求 / 响应类型

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::coaching::StruggleContext;
use crate::core::fusion::{BoundingBox, DetectedObject};
use crate::core::record::SessionRecord;
use crate::error::CollaboratorError;

/// 固定的教练系统提示
pub const COACH_SYSTEM_PROMPT: &str = "You are a hand hygiene coach. \
The trainee is stuck on one step of the WHO hand-washing procedure. \
Reply with one short, encouraging, actionable sentence.";

/// 单个检测结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    /// [x1, y1, x2, y2]
    pub bbox: Vec<f32>,
}

impl Detection {
    pub fn into_object(self) -> Result<DetectedObject, CollaboratorError> {
        let [x1, y1, x2, y2] = <[f32; 4]>::try_from(self.bbox.as_slice()).map_err(|_| {
            CollaboratorError::Malformed(format!(
                "bbox for `{}` has {} values",
                self.class_name,
                self.bbox.len()
            ))
        })?;

        if !self.confidence.is_finite() {
            return Err(CollaboratorError::Malformed(format!(
                "confidence for `{}` is not finite",
                self.class_name
            )));
        }

        Ok(DetectedObject {
            class_label: self.class_name,
            confidence: self.confidence.clamp(0.0, 1.0),
            bounding_box: BoundingBox { x1, y1, x2, y2 },
        })
    }
}

/// 检测响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub processing_time_ms: f64,
}

impl DetectionResponse {
    /// 任一条目残缺则整批视为无效
    pub fn into_objects(self) -> Result<Vec<DetectedObject>, CollaboratorError> {
        self.detections.into_iter().map(Detection::into_object).collect()
    }
}

/// 教练请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachRequest {
    pub current_step: String,
    pub step_label: String,
    /// 投入时长 (秒)
    pub duration: f64,
    pub motion_type: String,
    pub previous_attempts: u32,
    pub system_prompt: String,
}

impl From<&StruggleContext> for CoachRequest {
    fn from(ctx: &StruggleContext) -> Self {
        Self {
            current_step: ctx.step_id.clone(),
            step_label: ctx.step_label.clone(),
            duration: ctx.elapsed,
            motion_type: ctx.motion_type.clone(),
            previous_attempts: ctx.attempts,
            system_prompt: COACH_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// 教练响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachResponse {
    pub feedback: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
}

/// 会话上传 (后端使用 snake_case)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpload {
    pub session_id: String,
    pub user_id: String,
    pub task: String,
    pub start_time: String,
    pub end_time: String,
    /// 毫秒
    pub duration: u64,
    pub steps: Vec<serde_json::Value>,
    pub score: u8,
    pub metrics: serde_json::Value,
    pub feedback: Vec<serde_json::Value>,
}

impl From<&SessionRecord> for SessionUpload {
    fn from(record: &SessionRecord) -> Self {
        let steps = record
            .steps
            .iter()
            .map(|s| {
                json!({
                    "step": s.step_id,
                    "completedAt": s.completion_offset_ms,
                    "duration": s.accumulated_duration,
                    "feedback": s.feedback_text,
                })
            })
            .collect();

        let feedback = record
            .steps
            .iter()
            .filter(|s| !s.feedback_text.is_empty())
            .map(|s| json!({ "step": s.step_id, "text": s.feedback_text }))
            .collect();

        Self {
            session_id: record.session_id.clone(),
            user_id: record.user_id.clone(),
            task: record.task.clone(),
            start_time: record.start_time.to_rfc3339(),
            end_time: record.end_time.to_rfc3339(),
            duration: record.duration_ms,
            steps,
            score: record.score,
            metrics: json!({
                "averageStepTime": record.metrics.average_step_time,
                "completedSteps": record.completed_steps,
                "totalSteps": record.total_steps,
            }),
            feedback,
        }
    }
}

/// 会话保存响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSaveResponse {
    pub status: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub model_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{CompletedStep, SessionLog};
    use chrono::Utc;

    #[test]
    fn test_detection_response_parse() {
        let json = r#"{
            "detections": [
                {"class_name": "bottle", "confidence": 0.82, "bbox": [1.0, 2.0, 30.0, 40.0]}
            ],
            "count": 1,
            "processing_time_ms": 12.5
        }"#;
        let resp: DetectionResponse = serde_json::from_str(json).unwrap();
        let objects = resp.into_objects().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].class_label, "bottle");
        assert_eq!(objects[0].bounding_box.x2, 30.0);
    }

    #[test]
    fn test_malformed_bbox_rejected() {
        let resp = DetectionResponse {
            detections: vec![Detection {
                class_name: "cup".to_string(),
                confidence: 0.9,
                bbox: vec![1.0, 2.0],
            }],
            count: 1,
            processing_time_ms: 0.0,
        };
        assert!(matches!(resp.into_objects(), Err(CollaboratorError::Malformed(_))));
    }

    #[test]
    fn test_coach_request_from_context() {
        let ctx = StruggleContext {
            step_id: "thumbs".to_string(),
            step_label: "Clean your thumbs".to_string(),
            elapsed: 4.5,
            attempts: 1,
            motion_type: "sustained_activity".to_string(),
        };
        let req = CoachRequest::from(&ctx);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["current_step"], "thumbs");
        assert_eq!(json["previous_attempts"], 1);
        assert_eq!(json["system_prompt"], COACH_SYSTEM_PROMPT);
    }

    #[test]
    fn test_session_upload_shape() {
        let start = Utc::now();
        let mut log = SessionLog::new("s-1", "u-1", "hand_washing", start, 7);
        log.push(CompletedStep {
            step_id: "hands_visible".to_string(),
            completion_offset_ms: 1000,
            accumulated_duration: 1.0,
            feedback_text: "Great!".to_string(),
        });
        let record = log.finalize(start, 1000);

        let upload = SessionUpload::from(&record);
        let json = serde_json::to_value(&upload).unwrap();
        assert_eq!(json["session_id"], "s-1");
        assert_eq!(json["duration"], 1000);
        assert_eq!(json["steps"][0]["step"], "hands_visible");
        assert_eq!(json["feedback"][0]["text"], "Great!");
        assert_eq!(json["metrics"]["averageStepTime"], 1000.0);
    }
}
