//! 意图与工作流结果类型

use serde::{Deserialize, Serialize};

/// 单轮意图分类结果；每轮重新产生，不单独持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub category: String,
    pub action: String,
    /// 置信度，范围 [0, 1]
    pub confidence: f32,
}

impl Intent {
    pub fn new(category: impl Into<String>, action: impl Into<String>, confidence: f32) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
            confidence: clamp_confidence(confidence),
        }
    }

    /// 「通用协助」意图：不触发任何工作流
    pub fn generic(action: impl Into<String>) -> Self {
        Self::new("general", action, 0.0)
    }
}

pub(crate) fn clamp_confidence(c: f32) -> f32 {
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 1.0)
    }
}

/// 外部工作流引擎的执行结果；编排器只渲染或丢弃，不修改
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
    /// 引擎要求回退到默认（模型）路径
    #[serde(default)]
    pub use_default_flow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    /// 交还默认路径
    pub fn defer(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            use_default_flow: true,
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// 是否应该直接以该结果结束本轮
    pub fn is_final(&self) -> bool {
        self.success && !self.use_default_flow
    }
}
