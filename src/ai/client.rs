//! 后端服务客户端
//!
//! 与训练后端 (物体检测 / 教练 / 会话存储) 通信

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use tracing::{debug, info, warn};

use super::service::{CoachingService, ObjectDetector, SessionRecorder};
use super::types::*;
use crate::core::fusion::DetectedObject;
use crate::core::record::SessionRecord;
use crate::error::CollaboratorError;

/// 后端客户端
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    /// 创建新的客户端
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<Response, CollaboratorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CollaboratorError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// 物体检测: multipart 上传 JPEG
    pub async fn detect_objects(
        &self,
        jpeg: Bytes,
    ) -> Result<DetectionResponse, CollaboratorError> {
        let part = Part::bytes(jpeg.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().part("image", part);

        debug!("Sending detect request ({} bytes)", jpeg.len());

        let response = self
            .client
            .post(self.url("/detect"))
            .multipart(form)
            .send()
            .await?;

        let result: DetectionResponse = Self::check(response).await?.json().await?;
        debug!(
            "Received {} detections in {:.1}ms",
            result.count, result.processing_time_ms
        );

        Ok(result)
    }

    /// 教练反馈
    pub async fn ai_coach(
        &self,
        request: &CoachRequest,
    ) -> Result<CoachResponse, CollaboratorError> {
        debug!("Sending coach request for {}", request.current_step);

        let response = self
            .client
            .post(self.url("/ai-coach"))
            .json(request)
            .send()
            .await?;

        let result: CoachResponse = Self::check(response).await?.json().await?;
        if let Some(source) = &result.source {
            debug!("Coach feedback source: {}", source);
        }

        Ok(result)
    }

    /// 上传会话记录
    pub async fn save_session(
        &self,
        upload: &SessionUpload,
    ) -> Result<SessionSaveResponse, CollaboratorError> {
        let response = self
            .client
            .post(self.url("/sessions"))
            .json(upload)
            .send()
            .await?;

        let result: SessionSaveResponse = Self::check(response).await?.json().await?;
        info!("Session {} saved: {}", upload.session_id, result.status);

        Ok(result)
    }

    /// 健康检查
    pub async fn health(&self) -> Result<HealthResponse, CollaboratorError> {
        match self.client.get(self.url("/health")).send().await {
            Ok(resp) => Ok(Self::check(resp).await?.json().await?),
            Err(e) => {
                warn!("Health check failed: {}", e);
                Err(CollaboratorError::Unavailable(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl ObjectDetector for BackendClient {
    async fn detect(&self, jpeg: Bytes) -> Result<Vec<DetectedObject>, CollaboratorError> {
        self.detect_objects(jpeg).await?.into_objects()
    }
}

#[async_trait]
impl CoachingService for BackendClient {
    async fn coach(&self, request: &CoachRequest) -> Result<String, CollaboratorError> {
        let response = self.ai_coach(request).await?;
        if response.feedback.trim().is_empty() {
            return Err(CollaboratorError::Malformed("empty feedback".to_string()));
        }
        Ok(response.feedback)
    }
}

#[async_trait]
impl SessionRecorder for BackendClient {
    async fn record(&self, record: &SessionRecord) -> Result<(), CollaboratorError> {
        self.save_session(&SessionUpload::from(record)).await.map(|_| ())
    }
}
