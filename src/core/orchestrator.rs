//! 对话编排器：单轮回合驱动
//!
//! 一轮的流程：
//! 1. 用户消息写入会话存储
//! 2. 意图分类；高置信度且非通用意图时尝试工作流，成功则渲染结果并结束（不调用模型）
//! 3. 默认路径：完整历史 + 全部能力描述流式请求模型，聚合出文本 / 推理 / 工具调用
//! 4. 有工具调用时按聚合顺序逐个串行执行，再把结果作为一条 user 消息发起第二次流式合成
//! 5. 助手消息写入存储并持久化（成功与失败都会持久化）
//!
//! 模型流的任何失败都在本层被转换为一条致歉消息；持久化失败只记录日志，不影响返回。

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::core::{AgentError, TurnEvent, TurnPhase};
use crate::llm::{aggregate, AggregatedOutput, Fragment, LlmClient, ModelTurn};
use crate::memory::{Attachment, ConversationStore, Message, Role, ToolCall, ToolResult};
use crate::tools::{ToolExecutor, ToolSpec};
use crate::workflow::{render_workflow_result, IntentRouter};

/// 「首个输出到达」回调；每轮最多触发一次
pub type FirstOutputCallback = Box<dyn FnOnce() + Send>;

struct FirstOutput(Option<FirstOutputCallback>);

impl FirstOutput {
    fn fire(&mut self) {
        if let Some(cb) = self.0.take() {
            cb();
        }
    }
}

/// 会话上下文：由编排器独占的会话存储与工具执行器
pub struct SessionContext {
    pub store: ConversationStore,
    pub executor: ToolExecutor,
}

pub struct ChatOrchestrator {
    llm: Arc<dyn LlmClient>,
    router: IntentRouter,
    session: SessionContext,
    phase: TurnPhase,
    event_tx: Option<mpsc::UnboundedSender<TurnEvent>>,
}

fn send_event(tx: &Option<mpsc::UnboundedSender<TurnEvent>>, ev: TurnEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

fn forward_fragment(tx: &Option<mpsc::UnboundedSender<TurnEvent>>, fragment: &Fragment) {
    match fragment {
        Fragment::Text { text, is_thought: false } => {
            send_event(tx, TurnEvent::TextChunk { text: text.clone() })
        }
        Fragment::Text { text, is_thought: true } => {
            send_event(tx, TurnEvent::ThoughtChunk { text: text.clone() })
        }
        Fragment::FunctionCall { .. } => {}
    }
}

impl ChatOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        router: IntentRouter,
        executor: ToolExecutor,
        store: ConversationStore,
    ) -> Self {
        Self {
            llm,
            router,
            session: SessionContext { store, executor },
            phase: TurnPhase::Idle,
            event_tx: None,
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<TurnEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// 会话存储中的全部消息（最旧在前）
    pub fn history(&self) -> &[Message] {
        self.session.store.snapshot()
    }

    /// 从持久化存储恢复会话，返回恢复的消息数
    pub async fn load(&mut self) -> usize {
        self.session.store.load().await
    }

    /// 清空会话记忆（内存与持久化）
    pub async fn clear(&mut self) -> Result<(), AgentError> {
        self.session.store.clear().await?;
        Ok(())
    }

    fn advance(&mut self, next: TurnPhase) {
        if !self.phase.can_advance_to(next) {
            tracing::warn!(from = ?self.phase, to = ?next, "unexpected turn phase transition");
        }
        tracing::debug!(phase = ?next, "turn phase");
        self.phase = next;
        send_event(&self.event_tx, TurnEvent::Phase { phase: next });
    }

    /// 处理一轮用户输入，返回写入记忆的助手消息；本方法不会失败
    pub async fn handle_turn(
        &mut self,
        text: &str,
        attachments: Vec<Attachment>,
        on_first_output: Option<FirstOutputCallback>,
    ) -> Message {
        let started = Instant::now();
        let mut first = FirstOutput(on_first_output);

        self.advance(TurnPhase::Classifying);
        self.session
            .store
            .append(Message::user(text).with_attachments(attachments));

        let intent = self.router.classify(text).await;
        tracing::info!(
            category = %intent.category,
            action = %intent.action,
            confidence = intent.confidence,
            "intent classified"
        );
        send_event(
            &self.event_tx,
            TurnEvent::Intent {
                category: intent.category.clone(),
                action: intent.action.clone(),
                confidence: intent.confidence,
            },
        );

        let mut reply = None;
        if self.router.should_run_workflow(&intent) {
            self.advance(TurnPhase::WorkflowPath);
            let result = self
                .router
                .run_workflow(&intent, text, &self.session.executor)
                .await;
            if result.is_final() {
                first.fire();
                let content = render_workflow_result(&result);
                send_event(&self.event_tx, TurnEvent::TextChunk { text: content.clone() });
                reply = Some(Message::assistant(content));
            } else {
                tracing::info!(
                    action = %intent.action,
                    error = ?result.error,
                    "workflow did not complete, using default flow"
                );
            }
        }

        let reply = match reply {
            Some(msg) => msg,
            None => {
                self.advance(TurnPhase::DefaultPath);
                let mut executed = Vec::new();
                match self.run_default_path(&mut first, &mut executed).await {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::error!(error = %e, tools_run = executed.len(), "turn failed");
                        send_event(&self.event_tx, TurnEvent::Error { text: e.to_string() });
                        // 已执行的工具调用照常记录
                        Message::assistant_with_tools(
                            format!("Sorry, I ran into a problem while answering: {e}"),
                            executed,
                        )
                    }
                }
            }
        };
        let reply = reply.with_duration_ms(started.elapsed().as_millis() as u64);

        self.session.store.append(reply.clone());
        if let Err(e) = self.session.store.persist().await {
            tracing::error!(error = %e, "failed to persist conversation memory");
        }
        self.advance(TurnPhase::Persisted);
        send_event(&self.event_tx, TurnEvent::Done);
        self.advance(TurnPhase::Idle);
        reply
    }

    /// 默认路径；已执行的 (call, result) 累积在 executed 中，失败时由调用方保留
    async fn run_default_path(
        &mut self,
        first: &mut FirstOutput,
        executed: &mut Vec<(ToolCall, ToolResult)>,
    ) -> Result<Message, AgentError> {
        let history = build_history(self.session.store.snapshot());
        let specs = self.session.executor.specs();

        let initial = self.stream_pass(&history, &specs, first).await?;
        if initial.tool_calls.is_empty() {
            return Ok(Message::assistant(initial.response_text).with_thoughts(initial.reasoning_text));
        }

        // 串行执行，保证副作用顺序与模型请求顺序一致
        executed.reserve(initial.tool_calls.len());
        for pending in &initial.tool_calls {
            let call = ToolCall::new(
                pending.name.clone(),
                pending.args.clone().unwrap_or_else(|| json!({})),
            );
            send_event(
                &self.event_tx,
                TurnEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    args: call.args.clone(),
                },
            );
            let result = self.session.executor.execute(&call).await;
            send_event(
                &self.event_tx,
                TurnEvent::ToolResult {
                    id: call.id.clone(),
                    success: result.is_success(),
                },
            );
            executed.push((call, result));
        }

        self.advance(TurnPhase::Synthesizing);
        let mut working = history;
        if !initial.response_text.trim().is_empty() {
            working.push(ModelTurn::model(initial.response_text.clone()));
        }
        working.push(ModelTurn::user(synthesis_prompt(executed)));

        let synthesis = self.stream_pass(&working, &[], first).await?;
        if !synthesis.tool_calls.is_empty() {
            tracing::warn!(
                count = synthesis.tool_calls.len(),
                "ignoring tool calls requested during synthesis"
            );
        }

        Ok(Message::assistant_with_tools(synthesis.response_text, std::mem::take(executed))
            .with_thoughts(initial.reasoning_text))
    }

    async fn stream_pass(
        &self,
        history: &[ModelTurn],
        tools: &[ToolSpec],
        first: &mut FirstOutput,
    ) -> Result<AggregatedOutput, AgentError> {
        let stream = self.llm.stream(history, tools).await?;
        let tx = &self.event_tx;
        let out = aggregate(stream, |fragment| {
            first.fire();
            forward_fragment(tx, fragment);
        })
        .await?;
        Ok(out)
    }
}

/// 把存储中的消息转换成模型历史；tool 角色按 user 发送，空内容跳过
fn build_history(messages: &[Message]) -> Vec<ModelTurn> {
    messages
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| match m.role {
            Role::Assistant => ModelTurn::model(m.content.clone()),
            Role::User | Role::Tool => ModelTurn::user(m.content.clone()),
        })
        .collect()
}

/// 合成阶段的 user 指令：序列化的工具结果 + 请求最终回答
fn synthesis_prompt(executed: &[(ToolCall, ToolResult)]) -> String {
    let results: Vec<Value> = executed
        .iter()
        .map(|(call, result)| {
            json!({
                "toolCallId": call.id,
                "tool": call.name,
                "args": call.args,
                "result": result.result,
            })
        })
        .collect();
    let serialized = serde_json::to_string_pretty(&results).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Tool results:\n{serialized}\n\nUsing these tool results, write the final answer to my previous message."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::InMemoryBackend;
    use crate::tools::{EchoTool, ToolRegistry};
    use crate::workflow::NoopWorkflowEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator(llm: Arc<ScriptedLlmClient>) -> ChatOrchestrator {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        ChatOrchestrator::new(
            llm,
            IntentRouter::new(
                Arc::new(NoopWorkflowEngine::new("general_assistance")),
                0.8,
                "general_assistance",
            ),
            ToolExecutor::new(registry),
            ConversationStore::new(InMemoryBackend::new(), 19),
        )
    }

    #[test]
    fn test_build_history_maps_roles_and_skips_empty() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant(""),
            Message::assistant("hello"),
            Message::tool("raw output"),
        ];
        assert_eq!(
            build_history(&messages),
            vec![
                ModelTurn::user("hi"),
                ModelTurn::model("hello"),
                ModelTurn::user("raw output"),
            ]
        );
    }

    #[test]
    fn test_synthesis_prompt_contains_results() {
        let call = ToolCall::new("echo", json!({ "text": "x" }));
        let result = ToolResult {
            tool_call_id: call.id.clone(),
            result: json!({ "success": true, "text": "x" }),
            error: None,
        };
        let prompt = synthesis_prompt(&[(call.clone(), result)]);
        assert!(prompt.starts_with("Tool results:"));
        assert!(prompt.contains(&call.id));
        assert!(prompt.contains("final answer"));
    }

    #[tokio::test]
    async fn test_first_output_fires_once_and_phase_returns_idle() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_response(vec![Fragment::call("echo", Some(json!({ "text": "a" })))])
                .with_response(vec![Fragment::text("done"), Fragment::text("!")]),
        );
        let mut orch = orchestrator(llm);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let reply = orch
            .handle_turn(
                "say a",
                Vec::new(),
                Some(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .await;
        assert_eq!(reply.content, "done!");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(orch.phase(), TurnPhase::Idle);
        assert!(reply.duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_events_follow_turn_progress() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_response(vec![Fragment::call("echo", Some(json!({ "text": "a" })))])
                .with_response(vec![Fragment::text("ok")]),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut orch = orchestrator(llm).with_event_tx(tx);
        orch.handle_turn("go", Vec::new(), None).await;

        let mut phases = Vec::new();
        let mut saw_tool = false;
        let mut saw_done = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                TurnEvent::Phase { phase } => phases.push(phase),
                TurnEvent::ToolResult { success, .. } => saw_tool = success,
                TurnEvent::Done => saw_done = true,
                _ => {}
            }
        }
        assert_eq!(
            phases,
            vec![
                TurnPhase::Classifying,
                TurnPhase::DefaultPath,
                TurnPhase::Synthesizing,
                TurnPhase::Persisted,
                TurnPhase::Idle,
            ]
        );
        assert!(saw_tool);
        assert!(saw_done);
    }
}
