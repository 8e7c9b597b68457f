//! 工具参数 JSON Schema 生成（schemars）
//!
//! 工具用一个 `#[derive(JsonSchema, Deserialize)]` 的参数结构体描述入参，
//! 这里把它转成注入模型请求的 parameters 对象，并去掉顶层的 `$schema` / `title`。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 由参数类型生成 parameters schema
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| {
        serde_json::json!({ "type": "object", "properties": {} })
    });
    if let Value::Object(obj) = &mut value {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}
