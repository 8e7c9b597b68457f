//! 编排器构建器：统一的启动装配逻辑
//!
//! 按配置装配模型客户端、工具注册表、工作流引擎与记忆后端，并在返回前从持久化存储恢复会话。
//! 测试与嵌入方可以用 with_* 替换任意一个组件。

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentError, ChatOrchestrator};
use crate::llm::{GeminiClient, LlmClient, MockLlmClient};
use crate::memory::{ConversationStore, InMemoryBackend, JsonFileBackend, MemoryBackend};
use crate::tools::{ClockTool, EchoTool, PluginTool, Tool, ToolExecutor, ToolRegistry};
use crate::workflow::{IntentRouter, NoopWorkflowEngine, ScriptedWorkflowEngine, WorkflowEngine};

/// 读取 API Key 的环境变量，按顺序取第一个非空值
const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    engine: Option<Arc<dyn WorkflowEngine>>,
    backend: Option<Box<dyn MemoryBackend>>,
    extra_tools: Vec<Arc<dyn Tool>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            engine: None,
            backend: None,
            extra_tools: Vec::new(),
        }
    }

    /// 替换模型客户端（默认按 [llm] 段创建）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 替换工作流引擎（默认：有 [[workflows]] 时用脚本化引擎，否则不分类）
    pub fn with_workflow_engine(mut self, engine: Arc<dyn WorkflowEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// 替换记忆后端（默认按 [memory] 段创建）
    pub fn with_backend(mut self, backend: impl MemoryBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// 追加工具；与内置工具或插件同名时覆盖之
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.extra_tools.push(Arc::new(tool));
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 内置工具 → 配置插件 → 追加工具
    pub fn build_tool_registry(&self) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        tools.register(ClockTool);
        for entry in &self.config.tools.plugins {
            tools.register(PluginTool::new(entry));
        }
        for tool in &self.extra_tools {
            tools.register_shared(tool.clone());
        }
        tools
    }

    fn build_engine(&self) -> Arc<dyn WorkflowEngine> {
        if let Some(engine) = &self.engine {
            return engine.clone();
        }
        let generic = self.config.router.generic_action.clone();
        if self.config.workflows.is_empty() {
            Arc::new(NoopWorkflowEngine::new(generic))
        } else {
            Arc::new(ScriptedWorkflowEngine::new(
                self.config.workflows.clone(),
                generic,
            ))
        }
    }

    pub async fn build(self) -> Result<ChatOrchestrator, AgentError> {
        let llm = match &self.llm {
            Some(llm) => llm.clone(),
            None => create_llm_from_config(&self.config)?,
        };
        let engine = self.build_engine();
        let router = IntentRouter::new(
            engine,
            self.config.router.confidence_threshold,
            self.config.router.generic_action.clone(),
        );
        let executor = ToolExecutor::new(self.build_tool_registry());
        tracing::info!(tools = ?executor.tool_names(), "tools registered");

        let max_retained = self.config.memory.max_retained;
        let backend = match self.backend {
            Some(backend) => backend,
            None => create_backend_from_config(&self.config)?,
        };
        let store = ConversationStore::with_boxed(backend, max_retained);

        let mut orchestrator = ChatOrchestrator::new(llm, router, executor, store);
        let restored = orchestrator.load().await;
        tracing::info!(messages = restored, "conversation memory loaded");
        Ok(orchestrator)
    }
}

/// 按 [llm] 段创建模型客户端；gemini 缺少 API Key 时退回 Mock
pub fn create_llm_from_config(config: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let llm = &config.llm;
    match llm.provider.as_str() {
        "mock" => Ok(Arc::new(MockLlmClient)),
        "gemini" => match api_key_from_env() {
            Some(key) => {
                tracing::info!(model = %llm.model, "using Gemini model");
                Ok(Arc::new(
                    GeminiClient::new(llm.base_url.as_deref(), &llm.model, Some(&key))
                        .with_connect_timeout(llm.connect_timeout_secs)
                        .with_thoughts(llm.include_thoughts)
                        .with_system_instruction(llm.system_instruction.clone()),
                ))
            }
            None => {
                tracing::warn!(
                    "No API key found in {}, falling back to mock model",
                    API_KEY_VARS.join(" / ")
                );
                Ok(Arc::new(MockLlmClient))
            }
        },
        other => Err(AgentError::Config(format!("unknown llm provider: {other}"))),
    }
}

/// 按 [memory] 段创建记忆后端
pub fn create_backend_from_config(
    config: &AppConfig,
) -> Result<Box<dyn MemoryBackend>, AgentError> {
    match config.memory.backend.as_str() {
        "file" => Ok(Box::new(JsonFileBackend::new(&config.memory.path))),
        "memory" => Ok(Box::new(InMemoryBackend::new())),
        other => Err(AgentError::Config(format!("unknown memory backend: {other}"))),
    }
}

fn api_key_from_env() -> Option<String> {
    API_KEY_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.trim().is_empty())
}

/// 便捷函数：加载配置（失败时使用默认值）并创建构建器
pub fn create_orchestrator_builder(config_path: Option<PathBuf>) -> OrchestratorBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    OrchestratorBuilder::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PluginEntry, WorkflowEntry, WorkflowStep};
    use crate::llm::{Fragment, ScriptedLlmClient};
    use crate::memory::Message;
    use serde_json::json;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.provider = "mock".to_string();
        config.memory.backend = "memory".to_string();
        config
    }

    #[test]
    fn test_registry_has_builtins_and_plugins() {
        let mut config = memory_config();
        config.tools.plugins.push(PluginEntry {
            name: "uptime".to_string(),
            description: "System uptime".to_string(),
            program: "uptime".to_string(),
            args: Vec::new(),
            parameters: None,
            timeout_secs: 5,
        });
        let registry = OrchestratorBuilder::new(config).build_tool_registry();
        assert_eq!(registry.tool_names(), vec!["current_time", "echo", "uptime"]);
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let mut config = memory_config();
        config.memory.backend = "redis".to_string();
        assert!(matches!(
            create_backend_from_config(&config),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let mut config = memory_config();
        config.llm.provider = "nope".to_string();
        assert!(matches!(
            create_llm_from_config(&config),
            Err(AgentError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_build_restores_memory() {
        let backend = InMemoryBackend::new();
        let mut seed = ConversationStore::new(backend.clone(), 19);
        seed.append(Message::user("earlier"));
        seed.append(Message::assistant("reply"));
        seed.persist().await.unwrap();

        let orch = OrchestratorBuilder::new(memory_config())
            .with_backend(backend)
            .build()
            .await
            .unwrap();
        assert_eq!(orch.history().len(), 2);
        assert_eq!(orch.history()[0].content, "earlier");
    }

    #[tokio::test]
    async fn test_configured_workflow_answers_without_model() {
        let mut config = memory_config();
        config.workflows.push(WorkflowEntry {
            category: "util".to_string(),
            action: "echo_back".to_string(),
            keywords: vec!["repeat".to_string()],
            confidence: 0.95,
            summary: Some("Echoed.".to_string()),
            steps: vec![WorkflowStep {
                tool: "echo".to_string(),
                args: json!({ "text": "hi" }),
            }],
            recommendations: Vec::new(),
            next_steps: Vec::new(),
        });
        let llm = Arc::new(ScriptedLlmClient::new().with_response(vec![Fragment::text("model")]));
        let mut orch = OrchestratorBuilder::new(config)
            .with_llm(llm.clone())
            .build()
            .await
            .unwrap();

        let reply = orch.handle_turn("please repeat this", Vec::new(), None).await;
        assert!(reply.content.starts_with("Echoed."));
        assert_eq!(llm.call_count(), 0);
    }
}
