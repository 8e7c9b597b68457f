//! 意图路由与工作流：分类、阈值判断、脚本化流程执行与结果渲染

pub mod engine;
pub mod render;
pub mod router;
pub mod types;

pub use engine::{NoopWorkflowEngine, ScriptedWorkflowEngine, WorkflowEngine};
pub use render::render_workflow_result;
pub use router::IntentRouter;
pub use types::{Intent, WorkflowResult};
