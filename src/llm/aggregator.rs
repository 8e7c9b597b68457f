//! 流式输出聚合
//!
//! 把模型的片段序列按到达顺序归约为：回复文本、推理文本、重组后的工具调用列表。
//!
//! 函数调用按相邻合并：若最近排队的调用与新片段同名且尚无参数，则把新片段的参数并入该调用，
//! 否则新建一个调用；没有名称的片段直接丢弃。上游协议不保证片段间有稳定的调用 id，
//! 因此不做按 id 关联。该规则假设模型不会连续发出两个同名、且第一个不带参数的独立调用。

use futures_util::StreamExt;
use serde_json::Value;

use crate::llm::{Fragment, FragmentStream, LlmError};

/// 重组中的工具调用（尚未分配 id）
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub name: String,
    pub args: Option<Value>,
}

/// 一次流式生成的聚合结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedOutput {
    pub response_text: String,
    pub reasoning_text: String,
    pub tool_calls: Vec<PendingCall>,
}

#[derive(Debug, Default)]
pub struct StreamAggregator {
    out: AggregatedOutput,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::Text { text, is_thought: false } => self.out.response_text.push_str(&text),
            Fragment::Text { text, is_thought: true } => self.out.reasoning_text.push_str(&text),
            Fragment::FunctionCall { name: None, .. } => {
                tracing::debug!("dropping function-call fragment without a name");
            }
            Fragment::FunctionCall { name: Some(name), args } => {
                match self.out.tool_calls.last_mut() {
                    Some(last) if last.name == name && last.args.is_none() => {
                        last.args = args;
                    }
                    _ => self.out.tool_calls.push(PendingCall { name, args }),
                }
            }
        }
    }

    pub fn finish(self) -> AggregatedOutput {
        self.out
    }
}

/// 消费整条流并聚合；每个片段先交给 observe（用于首包回调与事件推送）。
/// 流中出现的第一个错误原样返回。
pub async fn aggregate(
    mut stream: FragmentStream,
    mut observe: impl FnMut(&Fragment) + Send,
) -> Result<AggregatedOutput, LlmError> {
    let mut aggregator = StreamAggregator::new();
    while let Some(item) = stream.next().await {
        let fragment = item?;
        observe(&fragment);
        aggregator.push(fragment);
    }
    Ok(aggregator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde_json::json;

    fn reduce(fragments: Vec<Fragment>) -> AggregatedOutput {
        let mut agg = StreamAggregator::new();
        for f in fragments {
            agg.push(f);
        }
        agg.finish()
    }

    #[test]
    fn test_text_and_thoughts_are_kept_apart() {
        let out = reduce(vec![
            Fragment::thought("Let me think. "),
            Fragment::text("Paris "),
            Fragment::thought("Done."),
            Fragment::text("is sunny."),
        ]);
        assert_eq!(out.response_text, "Paris is sunny.");
        assert_eq!(out.reasoning_text, "Let me think. Done.");
        assert!(out.tool_calls.is_empty());
    }

    #[test]
    fn test_name_then_args_merge_into_one_call() {
        let out = reduce(vec![
            Fragment::call("x", None),
            Fragment::call("x", Some(json!({ "a": 1 }))),
        ]);
        assert_eq!(
            out.tool_calls,
            vec![PendingCall {
                name: "x".to_string(),
                args: Some(json!({ "a": 1 })),
            }]
        );
    }

    #[test]
    fn test_same_name_with_args_already_set_is_a_new_call() {
        let out = reduce(vec![
            Fragment::call("x", Some(json!({ "a": 1 }))),
            Fragment::call("x", Some(json!({ "a": 2 }))),
        ]);
        assert_eq!(out.tool_calls.len(), 2);
        assert_eq!(out.tool_calls[1].args, Some(json!({ "a": 2 })));
    }

    #[test]
    fn test_only_most_recent_call_is_merge_candidate() {
        let out = reduce(vec![
            Fragment::call("x", None),
            Fragment::call("y", Some(json!({}))),
            Fragment::call("x", Some(json!({ "a": 1 }))),
        ]);
        let names: Vec<&str> = out.tool_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "x"]);
        assert_eq!(out.tool_calls[0].args, None);
    }

    #[test]
    fn test_nameless_fragment_is_discarded() {
        let out = reduce(vec![
            Fragment::call("x", None),
            Fragment::FunctionCall {
                name: None,
                args: Some(json!({ "a": 1 })),
            },
        ]);
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].args, None);
    }

    #[tokio::test]
    async fn test_aggregate_observes_each_fragment() {
        let s: FragmentStream = Box::pin(stream::iter(vec![
            Ok(Fragment::text("a")),
            Ok(Fragment::text("b")),
        ]));
        let mut seen = 0;
        let out = aggregate(s, |_| seen += 1).await.unwrap();
        assert_eq!(seen, 2);
        assert_eq!(out.response_text, "ab");
    }

    #[tokio::test]
    async fn test_aggregate_surfaces_mid_stream_error() {
        let s: FragmentStream = Box::pin(stream::iter(vec![
            Ok(Fragment::text("partial")),
            Err(LlmError::Stream("reset by peer".to_string())),
            Ok(Fragment::text("never")),
        ]));
        let err = aggregate(s, |_| {}).await.unwrap_err();
        assert_eq!(err, LlmError::Stream("reset by peer".to_string()));
    }
}
