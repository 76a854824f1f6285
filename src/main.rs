//! 洗手训练演示
//!
//! 用合成脚本或录制的关键点流驱动一次训练会话, 可选连接训练后端

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use handwash_coach::ai::service::{CoachingService, ObjectDetector, SessionRecorder};
use handwash_coach::hand::{LandmarkSource, ReplaySource, ScriptedSource};
use handwash_coach::utils::time::{format_mmss, format_mmss_ms, secs};
use handwash_coach::{
    BackendClient, EngineConfig, JsonFileRecorder, MemoryRecorder, RuleBasedCoach, TrainingEvent,
    TrainingSession,
};

#[derive(Parser, Debug)]
#[command(name = "handwash_coach", about = "Hand-washing procedure trainer")]
struct Args {
    /// TOML 配置文件
    #[arg(long)]
    config: Option<PathBuf>,

    /// 回放 JSON 行关键点流 (默认使用合成脚本)
    #[arg(long)]
    replay: Option<PathBuf>,

    /// 训练后端地址, 例如 http://localhost:8080
    #[arg(long)]
    backend: Option<String>,

    /// 协作调用超时 (秒), 覆盖配置
    #[arg(long)]
    timeout_secs: Option<f64>,

    /// 覆盖配置中的用户 id
    #[arg(long)]
    user: Option<String>,

    /// 合成脚本帧率
    #[arg(long, default_value_t = 30.0)]
    fps: f32,

    /// 按真实时间播放
    #[arg(long)]
    realtime: bool,

    /// 周期性提交给物体检测的 JPEG
    #[arg(long)]
    image: Option<PathBuf>,

    /// 会话记录写入的目录
    #[arg(long)]
    record_dir: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(user) = &args.user {
        config.user_id = user.clone();
    }
    if let Some(timeout) = args.timeout_secs {
        config.collaborator_timeout_secs = timeout;
    }
    let timeout_secs = config.collaborator_timeout_secs;
    let protocol = config.protocol()?;

    info!("╔══════════════════════════════════════╗");
    info!("║        洗手训练 - {} 个步骤          ║", protocol.len());
    info!("╚══════════════════════════════════════╝");

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = TrainingSession::new(config)?.with_event_channel(event_tx);

    let backend = match &args.backend {
        Some(url) => connect(url, timeout_secs).await,
        None => None,
    };

    let coach: Arc<dyn CoachingService> = match &backend {
        Some(client) => client.clone(),
        None => Arc::new(RuleBasedCoach::new(&protocol)),
    };
    session = session.with_coach(coach);

    if let Some(client) = &backend {
        let detector: Arc<dyn ObjectDetector> = client.clone();
        session = session.with_detector(detector);
    }

    let memory = Arc::new(MemoryRecorder::new());
    let recorder: Arc<dyn SessionRecorder> = match (&args.record_dir, &backend) {
        (Some(dir), _) => Arc::new(JsonFileRecorder::new(dir.clone())),
        (None, Some(client)) => client.clone(),
        (None, None) => memory.clone(),
    };
    session = session.with_recorder(recorder);

    let image = match &args.image {
        Some(path) => Some(Bytes::from(tokio::fs::read(path).await?)),
        None => None,
    };

    let mut source: Box<dyn LandmarkSource> = match &args.replay {
        Some(path) => Box::new(ReplaySource::open(path)?),
        None => {
            let scripted = ScriptedSource::hand_washing(args.fps);
            info!("合成脚本: {}", format_mmss(scripted.duration() as f64));
            Box::new(scripted)
        }
    };

    let frame_interval = secs(1.0 / args.fps.max(1.0) as f64);

    while let Some(frame) = source.next_frame() {
        let timestamp = frame.timestamp();
        session.on_tracker_frame(&frame);

        if let Some(jpeg) = &image {
            session.on_camera_frame(jpeg.clone(), timestamp);
        }

        while let Ok(event) = event_rx.try_recv() {
            log_event(&event);
        }

        if args.realtime {
            tokio::time::sleep(frame_interval).await;
        } else {
            tokio::task::yield_now().await;
        }

        if session.engine().is_closed() {
            break;
        }
    }

    if !session.engine().is_closed() {
        warn!("关键点流结束, 会话未完成");
        session.finish();
    }

    // 等待在途的教练 / 检测结果
    while session.next_result().await.is_some() {}
    session.flush().await;

    while let Ok(event) = event_rx.try_recv() {
        log_event(&event);
    }

    let stats = session.stats();
    info!("会话统计: {}", serde_json::to_string(&stats)?);

    if let Some(record) = memory.records().last() {
        info!("会话记录:\n{}", serde_json::to_string_pretty(record)?);
    }

    Ok(())
}

async fn connect(url: &str, timeout_secs: f64) -> Option<Arc<BackendClient>> {
    let client = match BackendClient::new(url, secs(timeout_secs)) {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to create backend client: {}", e);
            return None;
        }
    };

    match client.health().await {
        Ok(health) => {
            info!(
                "Backend {} is {} (model loaded: {})",
                client.base_url(),
                health.status,
                health.model_loaded
            );
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!("Backend unavailable, falling back to offline coach: {}", e);
            None
        }
    }
}

fn log_event(event: &TrainingEvent) {
    match event {
        TrainingEvent::StepCompleted {
            index,
            session_time,
            score,
            ..
        } => {
            info!(
                "[{}] 步骤 {} 完成: {} (得分 {})",
                format_mmss_ms(*session_time),
                index + 1,
                event.display_text(),
                score
            );
        }
        TrainingEvent::StruggleDetected { context, .. } => {
            info!("{} ({:.1}s)", event.display_text(), context.elapsed);
        }
        TrainingEvent::CoachingFeedback { step_id, .. } => {
            info!("教练 [{}]: {}", step_id, event.display_text());
        }
        TrainingEvent::ObjectsDetected { step_id, .. } => {
            info!("[{}] {}", step_id, event.display_text());
        }
        TrainingEvent::SessionCompleted { record, .. } => {
            info!(
                "{} 平均每步 {:.0}ms",
                event.display_text(),
                record.metrics.average_step_time
            );
        }
    }
}
