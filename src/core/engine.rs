//! 洗手训练核心引擎
//!
//! 一个会话的全部可变状态 (历史、步骤状态、完成日志) 都封装在
//! `TrainingEngine` 中。每帧同步运行到结束，不会重入:
//!
//! 1. 原始跟踪结果 → 帧适配器 → 观测
//! 2. 观测 → 运动历史
//! 3. 当前激活步骤的检测器 → 累计时长 → 完成事件
//! 4. 未完成时 → 教练触发策略

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::history::MotionHistory;
use crate::config::{EngineConfig, Protocol, StepDefinition};
use crate::core::coaching::CoachingPolicy;
use crate::core::event::TrainingEvent;
use crate::core::fusion::{DetectedObject, ObjectFusion};
use crate::core::progress::{StepMachine, StepStatus};
use crate::core::record::{CompletedStep, SessionLog, SessionRecord};
use crate::error::ConfigError;
use crate::hand::adapter::{FrameAdapter, RawTrackerFrame};
use crate::hand::landmark::FrameObservation;
use crate::utils::time::format_mmss;

/// 训练引擎 (一个会话的上下文)
pub struct TrainingEngine {
    config: Arc<EngineConfig>,
    protocol: Arc<Protocol>,
    fusion: Arc<ObjectFusion>,
    session_id: Uuid,
    history: MotionHistory,
    machine: StepMachine,
    policy: CoachingPolicy,
    log: SessionLog,
    /// 会话第一帧时间戳 (秒)
    first_timestamp: Option<f64>,
    /// 最近一次评估时间戳 (秒)
    last_timestamp: Option<f64>,
    frame_count: u64,
    /// 已定稿 (完成或放弃)
    closed: bool,
    record: Option<SessionRecord>,
}

impl TrainingEngine {
    /// 校验配置并开始新会话
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let protocol = Arc::new(config.protocol()?);
        let fusion = Arc::new(ObjectFusion::from_protocol(
            &protocol,
            config.detection_min_confidence,
        ));
        Ok(Self::start(Arc::new(config), protocol, fusion))
    }

    fn start(
        config: Arc<EngineConfig>,
        protocol: Arc<Protocol>,
        fusion: Arc<ObjectFusion>,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let log = SessionLog::new(
            session_id.to_string(),
            config.user_id.clone(),
            config.task.clone(),
            Utc::now(),
            protocol.len(),
        );

        info!("会话开始: {} ({} 个步骤)", session_id, protocol.len());

        Self {
            history: MotionHistory::new(config.history_window_secs),
            machine: StepMachine::new(protocol.len()),
            policy: CoachingPolicy::new(config.struggle_factor),
            log,
            session_id,
            first_timestamp: None,
            last_timestamp: None,
            frame_count: 0,
            closed: false,
            record: None,
            config,
            protocol,
            fusion,
        }
    }

    /// 整体替换所有运行时状态, 生成新的会话 id
    pub fn reset(&mut self) {
        let old = self.session_id;
        *self = Self::start(
            Arc::clone(&self.config),
            Arc::clone(&self.protocol),
            Arc::clone(&self.fusion),
        );
        info!("会话重置: {} -> {}", old, self.session_id);
    }

    /// 处理跟踪器的一帧原始结果
    pub fn process_frame(&mut self, raw: &RawTrackerFrame) -> Vec<TrainingEvent> {
        let observation = FrameAdapter::adapt(raw);
        self.process_observation(raw.timestamp(), observation)
    }

    /// 处理一帧观测 (`None` 表示本帧无有效手)
    pub fn process_observation(
        &mut self,
        timestamp: f64,
        observation: Option<FrameObservation>,
    ) -> Vec<TrainingEvent> {
        let mut events = Vec::new();

        if self.closed {
            return events;
        }
        if !timestamp.is_finite() {
            warn!("忽略时间戳无效的帧: {}", timestamp);
            return events;
        }

        self.frame_count += 1;
        let dt = self.frame_delta(timestamp);
        self.first_timestamp.get_or_insert(timestamp);
        self.last_timestamp = Some(self.last_timestamp.map_or(timestamp, |t| t.max(timestamp)));

        match &observation {
            Some(obs) => self.history.push(obs.clone()),
            None => self.history.prune(timestamp),
        }

        let Some(advance) = self.machine.advance(
            &self.protocol,
            dt,
            observation.as_ref(),
            &self.history,
        ) else {
            return events;
        };

        let protocol = Arc::clone(&self.protocol);
        let Some(def) = protocol.get(advance.index) else {
            return events;
        };

        if advance.completed {
            events.push(self.complete_step(advance.index, def));

            if self.machine.is_finished() {
                let record = self.finalize();
                info!(
                    "会话完成: {} 得分 {} 用时 {}",
                    self.session_id,
                    record.score,
                    format_mmss(self.session_time())
                );
                events.push(TrainingEvent::SessionCompleted {
                    session_id: self.session_id,
                    score: record.score,
                    record,
                });
            }
        } else if let Some(state) = self.machine.state_mut(advance.index) {
            if let Some(context) = self.policy.evaluate(def, state) {
                info!(
                    "步骤 {} 卡顿 ({:.1}s), 建议请求教练",
                    context.step_id, context.elapsed
                );
                events.push(TrainingEvent::StruggleDetected {
                    session_id: self.session_id,
                    context,
                });
            }
        }

        events
    }

    /// 距上次评估的时间, 限制在 [0, max_frame_delta]
    fn frame_delta(&self, timestamp: f64) -> f64 {
        match self.last_timestamp {
            Some(last) => (timestamp - last).clamp(0.0, self.config.max_frame_delta_secs),
            None => 0.0,
        }
    }

    fn complete_step(&mut self, index: usize, def: &StepDefinition) -> TrainingEvent {
        let session_time = self.session_time();
        let accumulated = self
            .machine
            .state(index)
            .map_or(0.0, |s| s.accumulated_duration());

        self.log.push(CompletedStep {
            step_id: def.id.clone(),
            completion_offset_ms: (session_time * 1000.0).round() as u64,
            accumulated_duration: accumulated,
            feedback_text: def.feedback.clone(),
        });

        info!(
            "步骤完成: [{}/{}] {} @ {}",
            index + 1,
            self.protocol.len(),
            def.id,
            format_mmss(session_time)
        );

        TrainingEvent::StepCompleted {
            session_id: self.session_id,
            step_id: def.id.clone(),
            label: def.label.clone(),
            index,
            session_time,
            accumulated_duration: accumulated,
            feedback: def.feedback.clone(),
            score: self.log.score(),
        }
    }

    fn finalize(&mut self) -> SessionRecord {
        let duration_ms = (self.session_time() * 1000.0).round() as u64;
        let record = self.log.finalize(Utc::now(), duration_ms);
        self.closed = true;
        self.record = Some(record.clone());
        record
    }

    /// 中途放弃: 以当前进度定稿, 已定稿时返回 `None`
    pub fn abandon(&mut self) -> Option<SessionRecord> {
        if self.closed {
            return None;
        }
        let record = self.finalize();
        info!(
            "会话放弃: {} 完成 {}/{} 得分 {}",
            self.session_id, record.completed_steps, record.total_steps, record.score
        );
        Some(record)
    }

    /// 应用教练回复
    ///
    /// 按回调时刻的状态判断: 会话已重置或步骤已完成时丢弃
    pub fn apply_coaching(
        &self,
        session_id: Uuid,
        step_id: &str,
        text: String,
    ) -> Option<TrainingEvent> {
        if session_id != self.session_id {
            debug!("丢弃过期会话的教练回复: {}", session_id);
            return None;
        }

        let index = self.protocol.position(step_id)?;
        if self.machine.status(index) == Some(StepStatus::Completed) {
            info!("步骤 {} 已完成, 丢弃迟到的教练回复", step_id);
            return None;
        }

        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        Some(TrainingEvent::CoachingFeedback {
            session_id,
            step_id: step_id.to_string(),
            text: text.to_string(),
        })
    }

    /// 应用物体检测结果 (只针对回调时刻的激活步骤, 不影响进度)
    pub fn apply_detections(
        &self,
        session_id: Uuid,
        objects: &[DetectedObject],
    ) -> Option<TrainingEvent> {
        if session_id != self.session_id {
            debug!("丢弃过期会话的检测结果: {}", session_id);
            return None;
        }

        let def = self.active_step()?;
        let matched = self.fusion.matches(&def.id, objects);
        if matched.is_empty() {
            return None;
        }

        let labels: Vec<String> = matched.iter().map(|o| o.class_label.clone()).collect();
        debug!("步骤 {} 检测到期望物体: {:?}", def.id, labels);

        Some(TrainingEvent::ObjectsDetected {
            session_id,
            step_id: def.id.clone(),
            labels,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn machine(&self) -> &StepMachine {
        &self.machine
    }

    pub fn history(&self) -> &MotionHistory {
        &self.history
    }

    /// 当前激活步骤
    pub fn active_step(&self) -> Option<&StepDefinition> {
        if self.closed {
            return None;
        }
        self.machine
            .active_index()
            .and_then(|i| self.protocol.get(i))
    }

    pub fn score(&self) -> u8 {
        self.log.score()
    }

    pub fn is_finished(&self) -> bool {
        self.machine.is_finished()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 定稿后的记录
    pub fn record(&self) -> Option<&SessionRecord> {
        self.record.as_ref()
    }

    /// 会话累计时间 (秒, 帧时间)
    pub fn session_time(&self) -> f64 {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.session_id,
            active_step: self.active_step().map(|s| s.id.clone()),
            completed_steps: self.machine.completed_count(),
            total_steps: self.protocol.len(),
            score: self.score(),
            history_len: self.history.len(),
            frame_count: self.frame_count,
            session_time: self.session_time(),
            coaching_used: None,
        }
    }
}

/// 会话统计快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub active_step: Option<String>,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub score: u8,
    pub history_len: usize,
    pub frame_count: u64,
    pub session_time: f64,
    /// 已使用的教练调用次数
    ///
    /// 预算由 `TrainingSession` 持有, 单独使用引擎时为 `None`
    pub coaching_used: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detector::Detector;
    use crate::core::fusion::BoundingBox;
    use crate::hand::adapter::RawLandmark;
    use crate::hand::source::synthetic_hand;

    fn two_hands(t_ms: f64, gap: f32) -> RawTrackerFrame {
        RawTrackerFrame::new(
            t_ms,
            vec![synthetic_hand(0.45, 0.6), synthetic_hand(0.45 + gap, 0.6)],
        )
    }

    fn run(
        engine: &mut TrainingEngine,
        frames: impl Iterator<Item = RawTrackerFrame>,
    ) -> Vec<TrainingEvent> {
        frames.flat_map(|f| engine.process_frame(&f)).collect()
    }

    #[test]
    fn test_engine_basic() {
        let mut engine = TrainingEngine::new(EngineConfig::default()).unwrap();
        assert_eq!(engine.active_step().unwrap().id, "hands_visible");

        // 3.5 秒双手静止
        let events = run(&mut engine, (0..=105).map(|i| two_hands(i as f64 * 1000.0 / 30.0, 0.05)));

        let completed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TrainingEvent::StepCompleted { step_id, .. } => Some(step_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec!["hands_visible", "wetting_motion"]);
        assert_eq!(engine.active_step().unwrap().id, "soap_application");
        assert_eq!(engine.score(), 29);
        assert!(!engine.is_finished());
    }

    #[test]
    fn test_frame_delta_clamped() {
        let config = EngineConfig {
            max_frame_delta_secs: 0.5,
            ..Default::default()
        };
        let mut engine = TrainingEngine::new(config).unwrap();

        engine.process_frame(&two_hands(0.0, 0.05));
        // 10 秒的空档只算 0.5 秒
        engine.process_frame(&two_hands(10_000.0, 0.05));

        let state = engine.machine().state(0).unwrap();
        assert!((state.accumulated_duration() - 0.5).abs() < 1e-9);
        assert!(!state.completed());
    }

    #[test]
    fn test_backwards_timestamp_adds_nothing() {
        let mut engine = TrainingEngine::new(EngineConfig::default()).unwrap();
        engine.process_frame(&two_hands(500.0, 0.05));
        engine.process_frame(&two_hands(100.0, 0.05));
        assert_eq!(engine.machine().state(0).unwrap().accumulated_duration(), 0.0);
        assert!((engine.session_time() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_frames_prune_history() {
        let mut engine = TrainingEngine::new(EngineConfig::default()).unwrap();
        for i in 0..10 {
            engine.process_frame(&two_hands(i as f64 * 100.0, 0.05));
        }
        assert_eq!(engine.history().len(), 10);

        engine.process_frame(&RawTrackerFrame::empty(5_000.0));
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_struggle_fires_once() {
        let config = EngineConfig {
            steps: vec![StepDefinition::new(
                "overlap",
                "Overlap",
                1.0,
                Detector::HandOverlap,
            )],
            ..Default::default()
        };
        let mut engine = TrainingEngine::new(config).unwrap();

        // 双手并排, 永远不交叠
        let events = run(&mut engine, (0..=150).map(|i| two_hands(i as f64 * 1000.0 / 30.0, 0.3)));
        let struggles = events
            .iter()
            .filter(|e| matches!(e, TrainingEvent::StruggleDetected { .. }))
            .count();
        assert_eq!(struggles, 1);
        assert!(engine.machine().state(0).unwrap().hint_issued());
    }

    #[test]
    fn test_coaching_after_completion_discarded() {
        let mut engine = TrainingEngine::new(EngineConfig::default()).unwrap();
        let sid = engine.session_id();

        assert!(engine
            .apply_coaching(sid, "hands_visible", "Show your hands".into())
            .is_some());

        run(&mut engine, (0..=40).map(|i| two_hands(i as f64 * 1000.0 / 30.0, 0.05)));
        assert!(engine.machine().state(0).unwrap().completed());
        assert!(engine
            .apply_coaching(sid, "hands_visible", "Show your hands".into())
            .is_none());

        // 过期会话
        assert!(engine
            .apply_coaching(Uuid::new_v4(), "wetting_motion", "Wet".into())
            .is_none());
    }

    #[test]
    fn test_detections_follow_active_step() {
        let mut engine = TrainingEngine::new(EngineConfig::default()).unwrap();
        let sid = engine.session_id();
        let objects = vec![DetectedObject::new("person", 0.9, BoundingBox::default())];

        match engine.apply_detections(sid, &objects) {
            Some(TrainingEvent::ObjectsDetected { step_id, labels, .. }) => {
                assert_eq!(step_id, "hands_visible");
                assert_eq!(labels, vec!["person".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }

        // 检测结果不影响进度
        assert_eq!(engine.machine().state(0).unwrap().accumulated_duration(), 0.0);

        engine.reset();
        assert!(engine.apply_detections(sid, &objects).is_none());
    }

    #[test]
    fn test_reset_replaces_everything() {
        let mut engine = TrainingEngine::new(EngineConfig::default()).unwrap();
        let old = engine.session_id();
        run(&mut engine, (0..=40).map(|i| two_hands(i as f64 * 1000.0 / 30.0, 0.05)));
        assert!(engine.score() > 0);

        engine.reset();
        assert_ne!(engine.session_id(), old);
        assert_eq!(engine.score(), 0);
        assert!(engine.history().is_empty());
        assert_eq!(engine.stats().frame_count, 0);
        assert_eq!(engine.active_step().unwrap().id, "hands_visible");
    }

    #[test]
    fn test_abandon_partial_record() {
        let mut engine = TrainingEngine::new(EngineConfig::default()).unwrap();
        run(&mut engine, (0..=40).map(|i| two_hands(i as f64 * 1000.0 / 30.0, 0.05)));

        let record = engine.abandon().unwrap();
        assert_eq!(record.completed_steps, 1);
        assert_eq!(record.score, 14);
        assert!(!record.finished);

        // 定稿后不再处理帧
        assert!(engine.abandon().is_none());
        assert!(engine.process_frame(&two_hands(99_999.0, 0.05)).is_empty());
        assert!(engine.active_step().is_none());
    }

    #[test]
    fn test_malformed_hand_counts_as_absent() {
        let mut engine = TrainingEngine::new(EngineConfig::default()).unwrap();
        let broken = vec![RawLandmark::new(0.5, 0.5); 5];
        for i in 0..60 {
            engine.process_frame(&RawTrackerFrame::new(i as f64 * 33.0, vec![broken.clone()]));
        }
        assert_eq!(engine.score(), 0);
        assert!(engine.history().is_empty());
    }

    #[test]
    fn test_huge_history_window_starts() {
        let config = EngineConfig {
            history_window_secs: 1e300,
            ..Default::default()
        };
        let mut engine = TrainingEngine::new(config).unwrap();
        run(&mut engine, (0..=40).map(|i| two_hands(i as f64 * 1000.0 / 30.0, 0.05)));
        assert_eq!(engine.history().len(), 41);
        assert_eq!(engine.stats().coaching_used, None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            steps: vec![],
            ..Default::default()
        };
        assert!(matches!(
            TrainingEngine::new(config),
            Err(ConfigError::EmptyProtocol)
        ));
    }
}
