//! 回合过程事件：供前端展示阶段、意图、流式文本与工具调用

use serde::Serialize;
use serde_json::Value;

use crate::core::TurnPhase;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Phase { phase: TurnPhase },
    Intent {
        category: String,
        action: String,
        confidence: f32,
    },
    /// 回复文本片段
    TextChunk { text: String },
    /// 推理文本片段
    ThoughtChunk { text: String },
    ToolCall {
        id: String,
        name: String,
        args: Value,
    },
    ToolResult {
        id: String,
        success: bool,
    },
    Error { text: String },
    /// 本轮结束（助手消息已写入记忆）
    Done,
}
