//! 当前时间工具

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::Tool;

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Return the current date and time in UTC (RFC 3339) and as Unix milliseconds."
    }

    async fn execute(&self, _args: Value) -> Result<Value, String> {
        let now = chrono::Utc::now();
        Ok(json!({
            "utc": now.to_rfc3339(),
            "unix_ms": now.timestamp_millis(),
        }))
    }
}
