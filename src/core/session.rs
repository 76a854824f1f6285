//! 训练会话驱动
//!
//! 持有 `TrainingEngine`, 逐帧同步推进; 教练 / 检测 / 记录调用在 tokio
//! 任务中进行, 结果带着会话 id 经由 mpsc 队列回到本驱动, 按回调时刻的
//! 引擎状态应用。引擎状态只由持有本驱动的任务修改

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ai::service::{CoachingService, ObjectDetector, SessionRecorder};
use crate::ai::types::CoachRequest;
use crate::config::EngineConfig;
use crate::core::coaching::{CoachingBudget, StruggleContext};
use crate::core::engine::{SessionStats, TrainingEngine};
use crate::core::event::TrainingEvent;
use crate::core::fusion::DetectedObject;
use crate::core::record::SessionRecord;
use crate::error::{CollaboratorError, ConfigError};
use crate::hand::adapter::RawTrackerFrame;
use crate::utils::time::secs;

/// 协作服务返回的结果
#[derive(Debug)]
pub enum Collaboration {
    Coaching {
        session_id: Uuid,
        step_id: String,
        outcome: Result<String, CollaboratorError>,
    },
    Detection {
        session_id: Uuid,
        outcome: Result<Vec<DetectedObject>, CollaboratorError>,
    },
}

/// 在独立任务中运行一次协作调用
///
/// 调用 panic、被取消或超过 `limit` 时返回 `Unavailable`, 保证结果一定送回
async fn guarded<T, F>(limit: Duration, call: F) -> Result<T, CollaboratorError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, CollaboratorError>> + Send + 'static,
{
    let mut task = tokio::spawn(call);
    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => Err(CollaboratorError::Unavailable(format!("call aborted: {}", e))),
        Err(_) => {
            task.abort();
            Err(CollaboratorError::Unavailable(format!(
                "no response within {:.1}s",
                limit.as_secs_f64()
            )))
        }
    }
}

/// 训练会话 (异步驱动)
pub struct TrainingSession {
    engine: TrainingEngine,
    budget: CoachingBudget,
    coach: Option<Arc<dyn CoachingService>>,
    detector: Option<Arc<dyn ObjectDetector>>,
    recorder: Option<Arc<dyn SessionRecorder>>,
    results_tx: mpsc::UnboundedSender<Collaboration>,
    results_rx: mpsc::UnboundedReceiver<Collaboration>,
    /// 尚未回来的协作调用数
    pending: usize,
    event_tx: Option<mpsc::UnboundedSender<TrainingEvent>>,
    /// 上次提交检测的帧时间 (秒)
    last_detection_at: Option<f64>,
    detection_in_flight: bool,
    uploads: Vec<JoinHandle<()>>,
}

impl TrainingSession {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let budget = CoachingBudget::new(config.coaching_cap);
        let engine = TrainingEngine::new(config)?;
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        Ok(Self {
            engine,
            budget,
            coach: None,
            detector: None,
            recorder: None,
            results_tx,
            results_rx,
            pending: 0,
            event_tx: None,
            last_detection_at: None,
            detection_in_flight: false,
            uploads: Vec::new(),
        })
    }

    pub fn with_coach(mut self, coach: Arc<dyn CoachingService>) -> Self {
        self.coach = Some(coach);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn ObjectDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn SessionRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// 设置事件通道
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<TrainingEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: &TrainingEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event.clone());
        }
    }

    /// 处理一帧跟踪结果
    ///
    /// 先应用已回来的协作结果, 再推进引擎。返回本次产生的全部事件
    pub fn on_tracker_frame(&mut self, raw: &RawTrackerFrame) -> Vec<TrainingEvent> {
        let mut events = self.drain_results();

        for event in self.engine.process_frame(raw) {
            match &event {
                TrainingEvent::StruggleDetected { context, .. } => {
                    self.request_coaching(context);
                }
                TrainingEvent::SessionCompleted { record, .. } => {
                    self.persist(record.clone());
                }
                _ => {}
            }
            self.emit(&event);
            events.push(event);
        }

        events
    }

    /// 提交一帧相机图像做物体检测 (按 `detection_interval_secs` 限频)
    pub fn on_camera_frame(&mut self, jpeg: Bytes, timestamp: f64) -> bool {
        if self.engine.is_closed() || self.detection_in_flight {
            return false;
        }
        let Some(detector) = self.detector.clone() else {
            return false;
        };

        let interval = self.engine.config().detection_interval_secs;
        if let Some(last) = self.last_detection_at {
            if timestamp >= last && timestamp - last < interval {
                return false;
            }
        }

        let Ok(handle) = Handle::try_current() else {
            warn!("没有 tokio 运行时, 跳过物体检测");
            return false;
        };

        let tx = self.results_tx.clone();
        let session_id = self.engine.session_id();
        let limit = self.call_timeout();
        self.last_detection_at = Some(timestamp);
        self.detection_in_flight = true;
        self.pending += 1;

        handle.spawn(async move {
            let outcome = guarded(limit, async move { detector.detect(jpeg).await }).await;
            let _ = tx.send(Collaboration::Detection { session_id, outcome });
        });

        true
    }

    fn request_coaching(&mut self, context: &StruggleContext) {
        let Some(coach) = self.coach.clone() else {
            debug!("未配置教练服务, 步骤 {} 的卡顿只作记录", context.step_id);
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!("没有 tokio 运行时, 跳过教练请求");
            return;
        };
        if !self.budget.try_acquire() {
            info!("本会话教练调用已达上限, 跳过步骤 {}", context.step_id);
            return;
        }

        let tx = self.results_tx.clone();
        let session_id = self.engine.session_id();
        let step_id = context.step_id.clone();
        let request = CoachRequest::from(context);
        let limit = self.call_timeout();
        self.pending += 1;

        debug!(
            "请求教练: {} ({}/{})",
            step_id,
            self.budget.used(),
            self.engine.config().coaching_cap
        );

        handle.spawn(async move {
            let outcome = guarded(limit, async move { coach.coach(&request).await }).await;
            let _ = tx.send(Collaboration::Coaching {
                session_id,
                step_id,
                outcome,
            });
        });
    }

    fn persist(&mut self, record: SessionRecord) {
        let Some(recorder) = self.recorder.clone() else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!("没有 tokio 运行时, 会话记录 {} 未保存", record.session_id);
            return;
        };

        let limit = self.call_timeout();
        self.uploads.push(handle.spawn(async move {
            let session_id = record.session_id.clone();
            let outcome = guarded(limit, async move { recorder.record(&record).await }).await;
            match outcome {
                Ok(()) => debug!("会话记录已保存: {}", session_id),
                Err(e) => warn!("会话记录保存失败 ({}): {}", session_id, e),
            }
        }));
    }

    fn call_timeout(&self) -> Duration {
        secs(self.engine.config().collaborator_timeout_secs)
    }

    fn apply(&mut self, result: Collaboration) -> Option<TrainingEvent> {
        self.pending = self.pending.saturating_sub(1);

        let event = match result {
            Collaboration::Coaching {
                session_id,
                step_id,
                outcome,
            } => match outcome {
                Ok(text) => self.engine.apply_coaching(session_id, &step_id, text),
                Err(e) => {
                    warn!("教练服务失败 ({}): {}", step_id, e);
                    None
                }
            },
            Collaboration::Detection { session_id, outcome } => {
                if session_id == self.engine.session_id() {
                    self.detection_in_flight = false;
                }
                match outcome {
                    Ok(objects) => self.engine.apply_detections(session_id, &objects),
                    Err(e) => {
                        warn!("物体检测失败: {}", e);
                        None
                    }
                }
            }
        };

        if let Some(event) = &event {
            self.emit(event);
        }
        event
    }

    /// 应用所有已到达的协作结果 (不等待)
    pub fn drain_results(&mut self) -> Vec<TrainingEvent> {
        let mut events = Vec::new();
        while let Ok(result) = self.results_rx.try_recv() {
            events.extend(self.apply(result));
        }
        events
    }

    /// 等待下一个协作结果并应用; 没有在途调用时返回 `None`
    pub async fn next_result(&mut self) -> Option<Option<TrainingEvent>> {
        if self.pending == 0 {
            return None;
        }
        let result = self.results_rx.recv().await?;
        Some(self.apply(result))
    }

    /// 在途协作调用数
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// 重新开始: 替换全部会话状态, 在途结果因会话 id 过期而被丢弃
    pub fn reset(&mut self) {
        self.engine.reset();
        self.budget = CoachingBudget::new(self.engine.config().coaching_cap);
        self.last_detection_at = None;
        self.detection_in_flight = false;
    }

    /// 中途结束: 以当前进度定稿并交给记录器
    pub fn finish(&mut self) -> Option<SessionRecord> {
        let record = self.engine.abandon()?;
        self.persist(record.clone());
        Some(record)
    }

    /// 等待所有记录上传结束
    pub async fn flush(&mut self) {
        for handle in self.uploads.drain(..) {
            if let Err(e) = handle.await {
                warn!("记录任务异常结束: {}", e);
            }
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            coaching_used: Some(self.budget.used()),
            ..self.engine.stats()
        }
    }

    pub fn engine(&self) -> &TrainingEngine {
        &self.engine
    }

    pub fn session_id(&self) -> Uuid {
        self.engine.session_id()
    }
}
