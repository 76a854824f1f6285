//! 物体检测融合
//!
//! 把检测到的物体与当前步骤的期望物体比对。只作提示，
//! 从不影响步骤完成或累计时长

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::Protocol;

/// 边界框 (x1, y1, x2, y2)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// 外部检测器返回的物体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub class_label: String,
    /// 置信度 (0-1)
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

impl DetectedObject {
    pub fn new(class_label: impl Into<String>, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            class_label: class_label.into(),
            confidence,
            bounding_box,
        }
    }
}

/// 步骤 id → 期望物体类别 的静态表
#[derive(Debug, Clone)]
pub struct ObjectFusion {
    expected: HashMap<String, Vec<String>>,
    min_confidence: f32,
}

impl ObjectFusion {
    pub fn new(expected: HashMap<String, Vec<String>>, min_confidence: f32) -> Self {
        let expected = expected
            .into_iter()
            .map(|(step, classes)| {
                (step, classes.into_iter().map(|c| c.to_lowercase()).collect())
            })
            .collect();
        Self { expected, min_confidence }
    }

    /// 从协议中每个步骤的 `expected_objects` 构建
    pub fn from_protocol(protocol: &Protocol, min_confidence: f32) -> Self {
        let table = protocol
            .steps()
            .iter()
            .filter(|s| !s.expected_objects.is_empty())
            .map(|s| (s.id.clone(), s.expected_objects.clone()))
            .collect();
        Self::new(table, min_confidence)
    }

    /// 与当前步骤匹配的物体 (类别名不区分大小写包含期望类别)
    pub fn matches<'a>(
        &self,
        step_id: &str,
        objects: &'a [DetectedObject],
    ) -> Vec<&'a DetectedObject> {
        let Some(expected) = self.expected.get(step_id) else {
            return Vec::new();
        };

        objects
            .iter()
            .filter(|o| o.confidence >= self.min_confidence)
            .filter(|o| {
                let label = o.class_label.to_lowercase();
                expected.iter().any(|e| label.contains(e.as_str()))
            })
            .collect()
    }

    /// 是否有任一物体匹配
    pub fn is_match(&self, step_id: &str, objects: &[DetectedObject]) -> bool {
        !self.matches(step_id, objects).is_empty()
    }
}
