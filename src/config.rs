//! 配置
//!
//! 会话配置在开始前一次性加载并校验; 校验失败的配置不会启动会话

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::detector::Detector;
use crate::error::ConfigError;

/// 步骤定义 (静态, 不可变)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: String,
    pub label: String,
    /// 所需累计时长 (秒)
    pub required_duration: f64,
    /// 默认反馈文本
    #[serde(default)]
    pub feedback: String,
    /// 该步骤期望看到的物体类别 (仅提示用)
    #[serde(default)]
    pub expected_objects: Vec<String>,
    pub detector: Detector,
}

impl StepDefinition {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        required_duration: f64,
        detector: Detector,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            required_duration,
            feedback: String::new(),
            expected_objects: Vec::new(),
            detector,
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }

    pub fn with_objects(mut self, objects: &[&str]) -> Self {
        self.expected_objects = objects.iter().map(|o| o.to_string()).collect();
        self
    }
}

/// 有序步骤协议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    steps: Vec<StepDefinition>,
}

impl Protocol {
    /// 校验后构造
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self, ConfigError> {
        let protocol = Self { steps };
        protocol.validate()?;
        Ok(protocol)
    }

    /// 七步洗手法
    pub fn hand_washing() -> Self {
        Self {
            steps: default_steps(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_steps(&self.steps)
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&StepDefinition> {
        self.steps.get(index)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::hand_washing()
    }
}

fn validate_steps(steps: &[StepDefinition]) -> Result<(), ConfigError> {
    if steps.is_empty() {
        return Err(ConfigError::EmptyProtocol);
    }

    let mut seen = HashSet::new();
    for step in steps {
        if !(step.required_duration > 0.0) || !step.required_duration.is_finite() {
            return Err(ConfigError::NonPositiveDuration {
                id: step.id.clone(),
                duration: step.required_duration,
            });
        }
        if !seen.insert(step.id.as_str()) {
            return Err(ConfigError::DuplicateStepId(step.id.clone()));
        }
        if let Detector::HandsTogether { max_palm_distance } = step.detector {
            if !step.detector.threshold_valid() {
                return Err(ConfigError::InvalidThreshold {
                    id: step.id.clone(),
                    threshold: max_palm_distance,
                });
            }
        }
    }

    Ok(())
}

fn default_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("hands_visible", "Show both hands", 1.0, Detector::HandsVisible)
            .with_feedback("Great! Keep your hands clearly visible.")
            .with_objects(&["person", "hand"]),
        StepDefinition::new(
            "wetting_motion",
            "Wet your hands",
            1.5,
            Detector::HandsTogether { max_palm_distance: 0.15 },
        )
        .with_feedback("Good wetting motion! Cover all surfaces.")
        .with_objects(&["sink", "cup"]),
        StepDefinition::new(
            "soap_application",
            "Apply soap and rub palms",
            3.0,
            Detector::CircularMotion,
        )
        .with_feedback("Excellent circular rubbing motion!")
        .with_objects(&["soap", "sanitizer", "bottle"]),
        StepDefinition::new(
            "interlace_fingers",
            "Interlace your fingers",
            3.0,
            Detector::HandOverlap,
        )
        .with_feedback("Nice! Make sure fingers are fully interlaced."),
        StepDefinition::new(
            "back_of_hands",
            "Scrub the backs of your hands",
            3.0,
            Detector::HandsTogether { max_palm_distance: 0.12 },
        )
        .with_feedback("Good job! Don't forget both backs."),
        StepDefinition::new("thumbs", "Clean your thumbs", 2.0, Detector::SustainedActivity)
            .with_feedback("Great thumb cleaning! Rotate them well."),
        StepDefinition::new("rinse_motion", "Rinse your hands", 3.0, Detector::VerticalMotion)
            .with_feedback("Excellent rinsing technique!")
            .with_objects(&["sink", "cup"]),
    ]
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

fn default_task() -> String {
    "hand_washing".to_string()
}

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_task")]
    pub task: String,
    /// 运动历史窗口 (秒)
    pub history_window_secs: f64,
    /// 单帧时间增量上限 (秒)
    pub max_frame_delta_secs: f64,
    /// 每个会话最多请求教练的次数
    pub coaching_cap: u32,
    /// 卡顿判定: 投入时长超过所需时长的倍数
    pub struggle_factor: f64,
    /// 物体检测间隔 (秒)
    pub detection_interval_secs: f64,
    /// 单次协作调用 (检测 / 教练 / 记录) 的超时 (秒)
    pub collaborator_timeout_secs: f64,
    /// 物体匹配置信度阈值
    pub detection_min_confidence: f32,
    pub steps: Vec<StepDefinition>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            task: default_task(),
            history_window_secs: 2.0,
            max_frame_delta_secs: 1.0,
            coaching_cap: 5,
            struggle_factor: 2.0,
            detection_interval_secs: 1.0,
            collaborator_timeout_secs: 10.0,
            detection_min_confidence: 0.5,
            steps: default_steps(),
        }
    }
}

impl EngineConfig {
    /// 从 TOML 文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("history_window_secs", self.history_window_secs),
            ("max_frame_delta_secs", self.max_frame_delta_secs),
            ("struggle_factor", self.struggle_factor),
            ("detection_interval_secs", self.detection_interval_secs),
            ("collaborator_timeout_secs", self.collaborator_timeout_secs),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        if !(0.0..=1.0).contains(&self.detection_min_confidence) {
            return Err(ConfigError::InvalidConfidence(self.detection_min_confidence));
        }

        validate_steps(&self.steps)
    }

    /// 校验后的步骤协议
    pub fn protocol(&self) -> Result<Protocol, ConfigError> {
        Protocol::new(self.steps.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_protocol() {
        let protocol = Protocol::hand_washing();
        assert_eq!(protocol.len(), 7);
        assert!(protocol.validate().is_ok());
        assert_eq!(protocol.position("soap_application"), Some(2));
        assert_eq!(protocol.get(6).unwrap().id, "rinse_motion");
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let steps = vec![StepDefinition::new("a", "A", 0.0, Detector::HandsVisible)];
        assert!(matches!(
            Protocol::new(steps),
            Err(ConfigError::NonPositiveDuration { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let steps = vec![
            StepDefinition::new("a", "A", 1.0, Detector::HandsVisible),
            StepDefinition::new("a", "A again", 1.0, Detector::HandOverlap),
        ];
        assert!(matches!(
            Protocol::new(steps),
            Err(ConfigError::DuplicateStepId(id)) if id == "a"
        ));
    }

    #[test]
    fn test_rejects_empty_and_bad_threshold() {
        assert!(matches!(Protocol::new(vec![]), Err(ConfigError::EmptyProtocol)));

        let steps = vec![StepDefinition::new(
            "a",
            "A",
            1.0,
            Detector::HandsTogether { max_palm_distance: -0.1 },
        )];
        assert!(matches!(
            Protocol::new(steps),
            Err(ConfigError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_engine_config_validation() {
        let config = EngineConfig {
            history_window_secs: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { field: "history_window_secs", .. })
        ));

        let config = EngineConfig {
            detection_min_confidence: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidConfidence(_))));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");

        let config = EngineConfig {
            coaching_cap: 3,
            user_id: "nurse-7".to_string(),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.coaching_cap, 3);
        assert_eq!(loaded.user_id, "nurse-7");
        assert_eq!(loaded.steps, config.steps);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str("coaching_cap = 2\n").unwrap();
        assert_eq!(config.coaching_cap, 2);
        assert_eq!(config.steps.len(), 7);
        assert_eq!(config.user_id, "anonymous");
    }

    #[test]
    fn test_custom_steps_from_toml() {
        let toml_str = r#"
            [[steps]]
            id = "show"
            label = "Show hands"
            required_duration = 0.5
            detector = { kind = "hands_visible" }

            [[steps]]
            id = "wet"
            label = "Wet"
            required_duration = 1.0
            detector = { kind = "hands_together", max_palm_distance = 0.2 }
            expected_objects = ["sink"]
        "#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        let protocol = config.protocol().unwrap();
        assert_eq!(protocol.len(), 2);
        assert_eq!(protocol.steps()[1].expected_objects, vec!["sink".to_string()]);
    }
}
