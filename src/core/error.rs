//! 编排层错误类型
//!
//! 工具失败与工作流失败在下层就被转换成数据（ToolResult.error / WorkflowResult.error），
//! 能到达编排器的只有模型流错误与持久化错误；前者在回合边界被转为致歉消息，后者只记录日志。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::PersistError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("model error: {0}")]
    Llm(#[from] LlmError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistError),

    #[error("config error: {0}")]
    Config(String),
}
