//! 核心模块: 检测器、步骤状态机、教练策略、评分与会话驱动

pub mod coaching;
pub mod detector;
pub mod engine;
pub mod event;
pub mod fusion;
pub mod progress;
pub mod record;
pub mod session;
