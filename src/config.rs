//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PARLEY__*` 覆盖（双下划线表示嵌套，如 `PARLEY__MEMORY__MAX_RETAINED=30`）。

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::memory::DEFAULT_MAX_RETAINED;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub memory: MemorySection,
    pub llm: LlmSection,
    pub router: RouterSection,
    pub tools: ToolsSection,
    /// 脚本化工作流（高置信度意图直接执行，不走模型）
    pub workflows: Vec<WorkflowEntry>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "parley".to_string(),
        }
    }
}

/// [memory] 段：持久化后端与保留条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// file / memory
    pub backend: String,
    pub path: PathBuf,
    pub max_retained: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: "file".to_string(),
            path: PathBuf::from("data/memory.json"),
            max_retained: DEFAULT_MAX_RETAINED,
        }
    }
}

/// [llm] 段：模型后端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// gemini / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 请求模型返回推理过程（thought parts）
    pub include_thoughts: bool,
    pub system_instruction: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash".to_string(),
            base_url: None,
            include_thoughts: true,
            system_instruction: None,
            connect_timeout_secs: 10,
        }
    }
}

/// [router] 段：意图路由策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    /// 置信度不低于该值才走工作流
    pub confidence_threshold: f32,
    /// 「通用协助」哨兵动作，命中时总是走默认路径
    pub generic_action: String,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            generic_action: "general_assistance".to_string(),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsSection {
    pub plugins: Vec<PluginEntry>,
}

/// [[tools.plugins]]：外部程序包装成的工具
#[derive(Debug, Clone, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    pub description: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// 参数 JSON Schema；缺省为无参数
    #[serde(default)]
    pub parameters: Option<Value>,
    #[serde(default = "default_plugin_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_plugin_timeout_secs() -> u64 {
    30
}

/// [[workflows]]：关键词触发的脚本化流程
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowEntry {
    pub category: String,
    pub action: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// 关键词命中时给出的置信度
    #[serde(default = "default_workflow_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

fn default_workflow_confidence() -> f32 {
    0.9
}

/// 工作流中的一步：调用一个工具
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowStep {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// 从 config 目录加载配置，环境变量 PARLEY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PARLEY__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PARLEY")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
