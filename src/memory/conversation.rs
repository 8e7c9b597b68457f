//! 会话数据模型：Message / ToolCall / ToolResult
//!
//! Message 一旦追加进 AgentMemory 即视为不可变；tool_calls 与 tool_results 按位置一一对应，
//! 由 `Message::assistant_with_tools` 以 (call, result) 对的形式构造，保证长度一致。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// 附件：不透明的媒体引用，原样透传与持久化
pub type Attachment = Value;

/// 一次工具调用请求；id 由编排器生成，不采用模型给出的标识
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            args,
        }
    }
}

/// 工具执行的归一化结果。
///
/// `result` 总是携带完整的 `{success, ...}` 载荷（失败时也保留，便于诊断）；
/// `error` 当且仅当载荷 `success == false` 时存在。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 单条消息（一轮对话中的一方发言）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// 推理过程文本，不混入 content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<String>,
    /// 创建时间（Unix 毫秒）
    pub timestamp: i64,
    /// 产生该消息的这一轮耗时（毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            thoughts: None,
            timestamp: now_millis(),
            duration_ms: None,
            tool_calls: None,
            tool_results: None,
            attachments: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// 带工具调用记录的助手消息；以 (call, result) 对传入，保证两个数组等长且按位置对应
    pub fn assistant_with_tools(
        content: impl Into<String>,
        executed: Vec<(ToolCall, ToolResult)>,
    ) -> Self {
        let mut msg = Self::assistant(content);
        if !executed.is_empty() {
            let (calls, results): (Vec<_>, Vec<_>) = executed.into_iter().unzip();
            msg.tool_calls = Some(calls);
            msg.tool_results = Some(results);
        }
        msg
    }

    /// 设置推理文本；空串视为无
    pub fn with_thoughts(mut self, thoughts: impl Into<String>) -> Self {
        let thoughts = thoughts.into();
        self.thoughts = if thoughts.trim().is_empty() {
            None
        } else {
            Some(thoughts)
        };
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = if attachments.is_empty() {
            None
        } else {
            Some(attachments)
        };
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
