//! Mock 模型客户端（无需 API）
//!
//! - MockLlmClient：回显最后一条 user 历史，便于本地跑通完整回合
//! - ScriptedLlmClient：按顺序回放预置的片段序列或连接失败，并记录每次收到的历史，供测试断言

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{Fragment, FragmentStream, LlmClient, LlmError, ModelRole, ModelTurn};
use crate::tools::ToolSpec;

/// 回显客户端
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn stream(
        &self,
        history: &[ModelTurn],
        _tools: &[ToolSpec],
    ) -> Result<FragmentStream, LlmError> {
        let last_user = history
            .iter()
            .rev()
            .find(|t| t.role == ModelRole::User)
            .map(|t| t.text.as_str())
            .unwrap_or("(no input)");
        let fragments = vec![Ok(Fragment::text(format!("Echo from Mock: {last_user}")))];
        Ok(Box::pin(stream::iter(fragments)))
    }
}

/// 一次脚本化响应
#[derive(Debug, Clone)]
pub enum Script {
    /// 依次产出这些片段（可包含流中错误）
    Fragments(Vec<Result<Fragment, LlmError>>),
    /// 连接阶段即失败
    Fail(LlmError),
}

/// 脚本化客户端：每次 stream 调用弹出一个 Script；脚本耗尽后返回 ScriptExhausted
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    scripts: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
    histories: Mutex<Vec<Vec<ModelTurn>>>,
    tool_names: Mutex<Vec<Vec<String>>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一段只含成功片段的响应
    pub fn with_response(self, fragments: Vec<Fragment>) -> Self {
        self.push(Script::Fragments(fragments.into_iter().map(Ok).collect()))
    }

    pub fn with_script(self, script: Script) -> Self {
        self.push(script)
    }

    fn push(self, script: Script) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(script);
        }
        self
    }

    /// 已发生的 stream 调用次数
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的历史（按调用顺序）
    pub fn histories(&self) -> Vec<Vec<ModelTurn>> {
        self.histories.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// 每次调用收到的能力名称（按调用顺序）
    pub fn tool_names(&self) -> Vec<Vec<String>> {
        self.tool_names.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn stream(
        &self,
        history: &[ModelTurn],
        tools: &[ToolSpec],
    ) -> Result<FragmentStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut h) = self.histories.lock() {
            h.push(history.to_vec());
        }
        if let Ok(mut t) = self.tool_names.lock() {
            t.push(tools.iter().map(|s| s.name.clone()).collect());
        }
        let next = self.scripts.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Script::Fragments(items)) => Ok(Box::pin(stream::iter(items))),
            Some(Script::Fail(e)) => Err(e),
            None => Err(LlmError::ScriptExhausted),
        }
    }
}
