//! Gemini 流式客户端
//!
//! 调用 `models/{model}:streamGenerateContent?alt=sse`，把 SSE 中每个 candidate 的 parts 映射为 Fragment：
//! - `{text, thought?}` → Fragment::Text
//! - `{functionCall: {name, args}}` → Fragment::FunctionCall
//!
//! 只设置连接超时；生成过程本身不设超时。

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};

use crate::llm::{Fragment, FragmentStream, LlmClient, LlmError, ModelRole, ModelTurn};
use crate::tools::ToolSpec;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_FLASH: &str = "gemini-2.5-flash";

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    include_thoughts: bool,
    system_instruction: Option<String>,
}

impl GeminiClient {
    /// api_key 未传入时依次读取 GEMINI_API_KEY、GOOGLE_API_KEY
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .unwrap_or_default();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key,
            include_thoughts: false,
            system_instruction: None,
        }
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "http client builder failed, using defaults");
                reqwest::Client::new()
            });
        self
    }

    pub fn with_thoughts(mut self, include: bool) -> Self {
        self.include_thoughts = include;
        self
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction.filter(|s| !s.trim().is_empty());
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }

    fn request_body(&self, history: &[ModelTurn], tools: &[ToolSpec]) -> Value {
        let contents: Vec<Value> = history
            .iter()
            .filter(|t| !t.text.trim().is_empty())
            .map(|t| {
                let role = match t.role {
                    ModelRole::User => "user",
                    ModelRole::Model => "model",
                };
                json!({ "role": role, "parts": [{ "text": t.text }] })
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if !tools.is_empty() {
            let declarations: Vec<Value> = tools.iter().map(function_declaration).collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }
        if let Some(instruction) = &self.system_instruction {
            body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
        }
        if self.include_thoughts {
            body["generationConfig"] = json!({ "thinkingConfig": { "includeThoughts": true } });
        }
        body
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn stream(
        &self,
        history: &[ModelTurn],
        tools: &[ToolSpec],
    ) -> Result<FragmentStream, LlmError> {
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(history, tools))
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let state = SseState {
            bytes: Box::pin(response.bytes_stream()),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        };
        let fragments = stream::unfold(state, |mut st| async move {
            loop {
                if let Some(f) = st.pending.pop_front() {
                    return Some((Ok(f), st));
                }
                if st.done {
                    return None;
                }
                let decoded = match st.bytes.next().await {
                    Some(Ok(chunk)) => st.decoder.feed(&chunk),
                    Some(Err(e)) => Err(LlmError::Stream(e.to_string())),
                    None => {
                        st.done = true;
                        st.decoder.finish()
                    }
                };
                match decoded {
                    Ok(fs) => st.pending.extend(fs),
                    Err(e) => {
                        st.done = true;
                        st.pending.clear();
                        return Some((Err(e), st));
                    }
                }
            }
        });
        Ok(Box::pin(fragments))
    }
}

struct SseState<S> {
    bytes: S,
    decoder: SseDecoder,
    pending: VecDeque<Fragment>,
    done: bool,
}

/// 增量 SSE 解码：按行切分（字节级缓冲，避免拆断 UTF-8），解析 `data:` 行
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Fragment>, LlmError> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            out.extend(decode_line(&line)?);
        }
        Ok(out)
    }

    /// 流结束时处理缓冲区中未以换行结尾的最后一行
    pub fn finish(&mut self) -> Result<Vec<Fragment>, LlmError> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Result<Vec<Fragment>, LlmError> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Vec::new());
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(data).map_err(|e| LlmError::Decode(e.to_string()))?;
    parse_chunk(&value)
}

/// 解析一个 GenerateContentResponse 块
pub fn parse_chunk(value: &Value) -> Result<Vec<Fragment>, LlmError> {
    if let Some(err) = value.get("error") {
        return Err(LlmError::Api {
            status: err
                .get("code")
                .and_then(|c| c.as_u64())
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(0),
            message: err
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    let parts = value
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array());
    let Some(parts) = parts else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for part in parts {
        if let Some(call) = part.get("functionCall") {
            out.push(Fragment::FunctionCall {
                name: call
                    .get("name")
                    .and_then(|n| n.as_str())
                    .filter(|n| !n.is_empty())
                    .map(String::from),
                args: call.get("args").filter(|a| !a.is_null()).cloned(),
            });
        } else if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            if text.is_empty() {
                continue;
            }
            let is_thought = part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false);
            out.push(Fragment::Text {
                text: text.to_string(),
                is_thought,
            });
        }
    }
    Ok(out)
}

fn function_declaration(spec: &ToolSpec) -> Value {
    let mut decl = json!({ "name": spec.name, "description": spec.description });
    let params = sanitize_schema(spec.parameters.clone());
    let has_properties = params
        .get("properties")
        .and_then(|p| p.as_object())
        .map(|p| !p.is_empty())
        .unwrap_or(false);
    if has_properties {
        decl["parameters"] = params;
    }
    decl
}

/// 去掉 Gemini 不接受的 JSON Schema 字段
fn sanitize_schema(mut schema: Value) -> Value {
    if let Value::Object(obj) = &mut schema {
        for key in ["$schema", "title", "default", "additionalProperties", "definitions"] {
            obj.remove(key);
        }
        if let Some(Value::Object(props)) = obj.get_mut("properties") {
            for (_, prop) in props.iter_mut() {
                *prop = sanitize_schema(prop.take());
            }
        }
        if let Some(items) = obj.get_mut("items") {
            *items = sanitize_schema(items.take());
        }
    }
    schema
}
