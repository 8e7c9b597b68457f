//! 工作流引擎契约与实现
//!
//! 引擎负责两件事：把自由文本分类为 Intent；在高置信度时执行预置流程。
//! 执行流程时只能通过传入的 ToolExecutor 调用工具，与模型路径共用同一条调度通道。
//! run_workflow 不返回错误：失败以 `success: false` / `use_default_flow: true` 表达。

use async_trait::async_trait;
use serde_json::Value;

use crate::config::WorkflowEntry;
use crate::memory::ToolCall;
use crate::tools::ToolExecutor;
use crate::workflow::{Intent, WorkflowResult};

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn classify(&self, text: &str) -> Intent;

    async fn run_workflow(&self, intent: &Intent, text: &str, tools: &ToolExecutor)
        -> WorkflowResult;
}

/// 不做任何分类的引擎：所有输入都走默认路径
#[derive(Debug, Clone)]
pub struct NoopWorkflowEngine {
    generic_action: String,
}

impl NoopWorkflowEngine {
    pub fn new(generic_action: impl Into<String>) -> Self {
        Self {
            generic_action: generic_action.into(),
        }
    }
}

#[async_trait]
impl WorkflowEngine for NoopWorkflowEngine {
    async fn classify(&self, _text: &str) -> Intent {
        Intent::generic(self.generic_action.clone())
    }

    async fn run_workflow(
        &self,
        _intent: &Intent,
        _text: &str,
        _tools: &ToolExecutor,
    ) -> WorkflowResult {
        WorkflowResult::defer("no workflows configured")
    }
}

/// 配置驱动的工作流：关键词命中即分类，按步骤顺序调用工具
pub struct ScriptedWorkflowEngine {
    workflows: Vec<WorkflowEntry>,
    generic_action: String,
}

/// 动作记录中结果预览的最大字符数
const RESULT_PREVIEW_CHARS: usize = 120;

impl ScriptedWorkflowEngine {
    pub fn new(workflows: Vec<WorkflowEntry>, generic_action: impl Into<String>) -> Self {
        Self {
            workflows,
            generic_action: generic_action.into(),
        }
    }

    fn find(&self, action: &str) -> Option<&WorkflowEntry> {
        self.workflows.iter().find(|w| w.action == action)
    }
}

#[async_trait]
impl WorkflowEngine for ScriptedWorkflowEngine {
    async fn classify(&self, text: &str) -> Intent {
        let lower = text.to_lowercase();
        self.workflows
            .iter()
            .find(|w| {
                w.keywords
                    .iter()
                    .any(|k| !k.trim().is_empty() && lower.contains(&k.to_lowercase()))
            })
            .map(|w| Intent::new(w.category.clone(), w.action.clone(), w.confidence))
            .unwrap_or_else(|| Intent::generic(self.generic_action.clone()))
    }

    async fn run_workflow(
        &self,
        intent: &Intent,
        _text: &str,
        tools: &ToolExecutor,
    ) -> WorkflowResult {
        let Some(entry) = self.find(&intent.action) else {
            return WorkflowResult::defer(format!("no workflow for action {}", intent.action));
        };

        let mut actions = Vec::with_capacity(entry.steps.len());
        for (i, step) in entry.steps.iter().enumerate() {
            let call = ToolCall::new(step.tool.clone(), step.args.clone());
            let result = tools.execute(&call).await;
            if let Some(err) = result.error {
                tracing::info!(
                    workflow = %entry.action,
                    step = i,
                    tool = %step.tool,
                    error = %err,
                    "workflow step failed, deferring to default flow"
                );
                return WorkflowResult::defer(format!("step {} ({}) failed: {}", i + 1, step.tool, err));
            }
            actions.push(format!("{}: {}", step.tool, result_preview(&result.result)));
        }

        WorkflowResult {
            success: true,
            summary: Some(
                entry
                    .summary
                    .clone()
                    .unwrap_or_else(|| format!("Completed {}.", entry.action)),
            ),
            actions,
            recommendations: entry.recommendations.clone(),
            next_steps: entry.next_steps.clone(),
            use_default_flow: false,
            error: None,
        }
    }
}

/// 去掉 success 标记后的紧凑预览
fn result_preview(result: &Value) -> String {
    let mut shown = result.clone();
    if let Value::Object(obj) = &mut shown {
        obj.remove("success");
    }
    let s = shown.to_string();
    if s.chars().count() > RESULT_PREVIEW_CHARS {
        format!("{}...", s.chars().take(RESULT_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}
