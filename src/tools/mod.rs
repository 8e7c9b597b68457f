//! 工具层：能力接口、注册表、执行器与内置工具

pub mod clock;
pub mod echo;
pub mod executor;
pub mod plugin;
pub mod registry;
pub mod schema;

pub use clock::ClockTool;
pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use plugin::PluginTool;
pub use registry::{Tool, ToolRegistry, ToolSpec};
pub use schema::parameters_schema_for;
