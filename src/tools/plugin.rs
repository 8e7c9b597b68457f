//! 插件工具：由配置 [[tools.plugins]] 注册，运行「程序 + 参数模板」扩展能力
//!
//! 参数模板中 {{key}} 从模型传入的 args 中取 key；不经过 shell，直接 exec program + 替换后的参数。
//! 超时属于插件自身的 I/O 策略（编排核心不设超时）。

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::config::PluginEntry;
use crate::tools::Tool;

pub struct PluginTool {
    name: String,
    description: String,
    program: String,
    args_template: Vec<String>,
    parameters: Option<Value>,
    timeout: Duration,
}

impl PluginTool {
    pub fn new(entry: &PluginEntry) -> Self {
        Self {
            name: entry.name.clone(),
            description: entry.description.clone(),
            program: entry.program.clone(),
            args_template: entry.args.clone(),
            parameters: entry.parameters.clone(),
            timeout: Duration::from_secs(entry.timeout_secs),
        }
    }

    /// 替换模板中的 {{key}}；未提供的 key 保持原样
    fn substitute(&self, args: &Value) -> Vec<String> {
        let empty = serde_json::Map::new();
        let obj = args.as_object().unwrap_or(&empty);
        self.args_template
            .iter()
            .map(|tpl| {
                let mut s = tpl.clone();
                for (k, v) in obj {
                    let placeholder = format!("{{{{{}}}}}", k);
                    let val = match v {
                        Value::String(x) => x.clone(),
                        _ => v.to_string(),
                    };
                    s = s.replace(&placeholder, &val);
                }
                s
            })
            .collect()
    }
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone().unwrap_or_else(|| {
            json!({ "type": "object", "properties": {}, "required": [] })
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let argv = self.substitute(&args);
        tracing::debug!(tool = %self.name, program = %self.program, "plugin tool invoke");
        let child = Command::new(&self.program)
            .args(&argv)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("plugin spawn failed: {e}"))?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("plugin timeout after {}s", self.timeout.as_secs()))?
            .map_err(|e| format!("plugin wait failed: {e}"))?;
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Ok(json!({
                "success": false,
                "error": format!("exit {:?}: {}", output.status.code(), stderr),
                "stdout": stdout,
            }));
        }
        Ok(json!({ "stdout": stdout }))
    }
}
