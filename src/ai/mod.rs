pub mod client;
pub mod service;
pub mod types;

pub use client::BackendClient;
pub use service::{
    CoachingService, JsonFileRecorder, MemoryRecorder, ObjectDetector, RuleBasedCoach,
    SessionRecorder,
};
