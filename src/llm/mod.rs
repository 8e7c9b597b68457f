//! 模型层：流式接口抽象、片段聚合与实现（Gemini / Mock）

pub mod aggregator;
pub mod gemini;
pub mod mock;
pub mod traits;

pub use aggregator::{aggregate, AggregatedOutput, PendingCall, StreamAggregator};
pub use gemini::{GeminiClient, GEMINI_BASE_URL, GEMINI_FLASH};
pub use mock::{MockLlmClient, Script, ScriptedLlmClient};
pub use traits::{Fragment, FragmentStream, LlmClient, LlmError, ModelRole, ModelTurn};
