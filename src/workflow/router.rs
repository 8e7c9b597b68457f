//! 意图路由：外部工作流引擎的薄适配层
//!
//! classify 得到 Intent；置信度不低于阈值且动作不是「通用协助」哨兵时，才进入工作流路径。
//! 引擎内部的 panic 在这里被截住：分类退化为通用意图，执行退化为交还默认路径。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::tools::ToolExecutor;
use crate::workflow::types::clamp_confidence;
use crate::workflow::{Intent, WorkflowEngine, WorkflowResult};

pub struct IntentRouter {
    engine: Arc<dyn WorkflowEngine>,
    threshold: f32,
    generic_action: String,
}

impl IntentRouter {
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        threshold: f32,
        generic_action: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            threshold,
            generic_action: generic_action.into(),
        }
    }

    pub async fn classify(&self, text: &str) -> Intent {
        match AssertUnwindSafe(self.engine.classify(text)).catch_unwind().await {
            Ok(mut intent) => {
                intent.confidence = clamp_confidence(intent.confidence);
                intent
            }
            Err(_) => {
                tracing::error!("workflow engine panicked during classify");
                Intent::generic(self.generic_action.clone())
            }
        }
    }

    pub fn should_run_workflow(&self, intent: &Intent) -> bool {
        intent.confidence >= self.threshold && intent.action != self.generic_action
    }

    pub async fn run_workflow(
        &self,
        intent: &Intent,
        text: &str,
        tools: &ToolExecutor,
    ) -> WorkflowResult {
        let fut = self.engine.run_workflow(intent, text, tools);
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(action = %intent.action, "workflow engine panicked");
                WorkflowResult::defer("workflow engine panicked")
            }
        }
    }
}
