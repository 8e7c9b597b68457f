//! 模型流式接口抽象
//!
//! 所有后端（Gemini / Mock）实现 LlmClient::stream：给定有序历史与可用能力描述，
//! 返回逐片到达的输出（普通文本、推理文本、或可能不完整的函数调用）。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::tools::ToolSpec;

/// 模型历史中的角色（模型侧只区分 user / model）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    User,
    Model,
}

/// 发送给模型的一条历史
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelTurn {
    pub role: ModelRole,
    pub text: String,
}

impl ModelTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ModelRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ModelRole::Model,
            text: text.into(),
        }
    }
}

/// 流式输出的一个片段
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// 文本；is_thought 为 true 时是推理过程
    Text { text: String, is_thought: bool },
    /// 函数调用公告；名称与参数可能分散在多个片段中到达
    FunctionCall {
        name: Option<String>,
        args: Option<Value>,
    },
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Fragment::Text {
            text: text.into(),
            is_thought: false,
        }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Fragment::Text {
            text: text.into(),
            is_thought: true,
        }
    }

    pub fn call(name: impl Into<String>, args: Option<Value>) -> Self {
        Fragment::FunctionCall {
            name: Some(name.into()),
            args,
        }
    }
}

/// 模型调用错误（连接失败、HTTP 状态异常、流中断、响应无法解析）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("model service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("malformed model output: {0}")]
    Decode(String),

    #[error("no scripted response left")]
    ScriptExhausted,
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, LlmError>> + Send>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 以流的形式请求一次生成；连接阶段的失败直接返回 Err，流中的失败以 Err 片段出现
    async fn stream(
        &self,
        history: &[ModelTurn],
        tools: &[ToolSpec],
    ) -> Result<FragmentStream, LlmError>;
}
