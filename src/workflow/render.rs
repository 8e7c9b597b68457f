//! 工作流结果渲染：固定模板，摘要行在前，随后按固定顺序输出非空列表

use crate::workflow::WorkflowResult;

const ACTIONS_HEADING: &str = "**Actions taken:**";
const RECOMMENDATIONS_HEADING: &str = "**Recommendations:**";
const NEXT_STEPS_HEADING: &str = "**Next steps:**";

pub fn render_workflow_result(result: &WorkflowResult) -> String {
    let mut sections: Vec<String> = Vec::new();
    if let Some(summary) = result.summary.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        sections.push(summary.to_string());
    }
    for (heading, items) in [
        (ACTIONS_HEADING, &result.actions),
        (RECOMMENDATIONS_HEADING, &result.recommendations),
        (NEXT_STEPS_HEADING, &result.next_steps),
    ] {
        if items.is_empty() {
            continue;
        }
        let mut block = String::from(heading);
        for item in items {
            block.push_str("\n- ");
            block.push_str(item);
        }
        sections.push(block);
    }
    sections.join("\n\n")
}
