//! 回合状态机
//!
//! Idle → Classifying → {WorkflowPath | DefaultPath} → Synthesizing → Persisted → Idle。
//! 工作流成功或无工具调用时跳过 Synthesizing，直接进入 Persisted。

use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,
    Classifying,
    WorkflowPath,
    DefaultPath,
    Synthesizing,
    Persisted,
}

impl TurnPhase {
    /// 是否为合法的状态迁移
    pub fn can_advance_to(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (Idle, Classifying)
                | (Classifying, WorkflowPath)
                | (Classifying, DefaultPath)
                | (WorkflowPath, DefaultPath)
                | (WorkflowPath, Persisted)
                | (DefaultPath, Synthesizing)
                | (DefaultPath, Persisted)
                | (Synthesizing, Persisted)
                | (Persisted, Idle)
        )
    }
}
