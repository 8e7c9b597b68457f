//! 核心编排层：错误类型、回合状态机、过程事件、编排器与启动装配

pub mod builder;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod state;

pub use builder::{
    create_backend_from_config, create_llm_from_config, create_orchestrator_builder,
    OrchestratorBuilder,
};
pub use error::AgentError;
pub use events::TurnEvent;
pub use orchestrator::{ChatOrchestrator, FirstOutputCallback, SessionContext};
pub use state::TurnPhase;
