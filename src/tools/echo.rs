//! Echo 工具（连通性测试用）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::{parameters_schema_for, Tool};

#[derive(Deserialize, JsonSchema)]
struct EchoArgs {
    /// 要回显的文本
    text: String,
}

/// Echo 工具：回显文本
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back unchanged. Useful for testing tool plumbing."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<EchoArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let args: EchoArgs =
            serde_json::from_value(args).map_err(|e| format!("invalid echo args: {e}"))?;
        Ok(json!({ "text": args.text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo() {
        let out = EchoTool.execute(json!({ "text": "hi" })).await.unwrap();
        assert_eq!(out["text"], "hi");
        assert!(EchoTool.execute(json!({})).await.is_err());
    }
}
