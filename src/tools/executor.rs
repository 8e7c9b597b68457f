//! 工具执行器
//!
//! 持有只读的 ToolRegistry，execute(call) 按名称解析工具并在一个失败边界内执行：
//! 未知工具、工具返回失败、工具 panic 都被转换为 `{success: false, error}` 的 ToolResult，从不向上抛出。
//! 执行器本身不加重试和超时，这类策略属于各个工具自身；每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures_util::FutureExt;
use serde_json::{json, Value};

use crate::memory::{ToolCall, ToolResult};
use crate::tools::{Tool, ToolRegistry, ToolSpec};

pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// 执行一次工具调用，返回与 call.id 对应的归一化结果
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let (outcome, result) = match self.registry.get(&call.name) {
            None => (
                "unknown",
                failure(format!("Unknown tool: {}", call.name)),
            ),
            Some(tool) => {
                let fut = tool.execute(call.args.clone());
                match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(raw) => {
                        let normalized = normalize(raw);
                        let label = if success_flag(&normalized) { "ok" } else { "error" };
                        (label, normalized)
                    }
                    Err(panic) => ("panic", failure(panic_message(panic.as_ref()))),
                }
            }
        };

        let audit = json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(target: "parley::audit", audit = %audit, "tool");

        let error = if success_flag(&result) {
            None
        } else {
            Some(
                result
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("tool reported failure")
                    .to_string(),
            )
        };
        ToolResult {
            tool_call_id: call.id.clone(),
            result,
            error,
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<std::sync::Arc<dyn Tool>> {
        self.registry.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 全部能力描述（随模型请求下发）
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }
}

/// 把工具的原始返回归一化为 `{success, ...payload}`
pub fn normalize(raw: Result<Value, String>) -> Value {
    match raw {
        Ok(Value::Object(mut obj)) => {
            let has_error = matches!(obj.get("error"), Some(Value::String(_)));
            // 非布尔的 success 以是否带 error 字符串判定
            let ok = match obj.get("success") {
                None => true,
                Some(Value::Bool(b)) => *b,
                Some(_) => !has_error,
            };
            obj.insert("success".to_string(), Value::Bool(ok));
            if !ok && !has_error {
                obj.insert("error".to_string(), json!("tool reported failure"));
            }
            Value::Object(obj)
        }
        Ok(other) => json!({ "success": true, "output": other }),
        Err(reason) => failure(reason),
    }
}

fn failure(reason: impl Into<String>) -> Value {
    json!({ "success": false, "error": reason.into() })
}

fn success_flag(result: &Value) -> bool {
    result.get("success").and_then(|s| s.as_bool()).unwrap_or(false)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("tool panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("tool panicked: {s}")
    } else {
        "tool panicked".to_string()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
