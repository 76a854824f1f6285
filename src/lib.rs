//! 洗手训练核心库
//!
//! 核心机制: 手部关键点 → 运动历史 → 步骤检测器 → 有序步骤状态机
//! - 每一步需在检测器为真时累计到所需时长
//! - 步骤严格按顺序完成, 完成即锁定
//! - 卡顿时请求外部教练, 全部完成后生成会话记录

pub mod ai;
pub mod buffer;
pub mod config;
pub mod core;
pub mod error;
pub mod hand;
pub mod utils;

// Re-exports - 核心引擎
pub use core::engine::{SessionStats, TrainingEngine};
pub use core::event::TrainingEvent;
pub use core::session::{Collaboration, TrainingSession};
pub use core::detector::Detector;
pub use core::progress::{StepMachine, StepRuntimeState, StepStatus};
pub use core::coaching::{CoachingBudget, CoachingPolicy, StruggleContext};
pub use core::fusion::{BoundingBox, DetectedObject, ObjectFusion};
pub use core::record::{CompletedStep, SessionLog, SessionMetrics, SessionRecord};

// Re-exports - 配置 / 错误
pub use config::{EngineConfig, Protocol, StepDefinition};
pub use error::{CollaboratorError, ConfigError};

// Re-exports - 输入
pub use buffer::MotionHistory;
pub use hand::{
    FrameAdapter, FrameObservation, HandSample, Landmark, LandmarkSource, RawLandmark,
    RawTrackerFrame,
};

// Re-exports - AI
pub use ai::client::BackendClient;
pub use ai::service::{
    CoachingService, JsonFileRecorder, MemoryRecorder, ObjectDetector, RuleBasedCoach,
    SessionRecorder,
};
