//! 错误类型
//!
//! - `ConfigError`: 会话配置错误，会话开始前即被拒绝
//! - `CollaboratorError`: 外部服务 (检测 / 教练 / 记录) 失败，本地恢复

use thiserror::Error;

/// 配置错误 (致命，只在配置阶段出现)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("protocol has no steps")]
    EmptyProtocol,

    #[error("step `{id}` has non-positive required duration {duration}")]
    NonPositiveDuration { id: String, duration: f64 },

    #[error("duplicate step id `{0}`")]
    DuplicateStepId(String),

    #[error("step `{id}` has invalid detector threshold {threshold}")]
    InvalidThreshold { id: String, threshold: f32 },

    #[error("`{field}` must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("confidence threshold {0} outside [0, 1]")]
    InvalidConfidence(f32),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// 外部协作服务错误
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
