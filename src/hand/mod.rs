//! 手部关键点: 数据模型、适配器、来源

pub mod adapter;
pub mod landmark;
pub mod source;

pub use adapter::{FrameAdapter, RawLandmark, RawTrackerFrame};
pub use landmark::{FrameObservation, HandSample, Landmark};
pub use source::{LandmarkSource, Motion, ReplaySource, ScriptedSource};
