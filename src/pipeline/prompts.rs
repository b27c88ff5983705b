//! 各阶段的 system prompt
//!
//! 每个阶段的 prompt 以固定开头区分（测试中 Mock 按前缀匹配），输出 Schema 拼在后面。

use crate::pipeline::{Evaluation, GenerationPlan, Understanding};
use crate::tools::output_schema_json;

pub const ANALYZE_SYSTEM_PROMPT: &str = "You are a senior software analyst. \
Read the user's coding instruction together with the project context and extract what has to be done.\n\
- objective: one sentence describing the goal.\n\
- requiredFeatures: the concrete changes or features, in order.\n\
- contextRelevance: for each file that matters, a relevance score between 0 and 1.\n\
If a file you need is not in the context, use the tools to read it first.";

pub const PLAN_SYSTEM_PROMPT: &str = "You are a software implementation planner. \
Turn the analysed request into an ordered list of small, concrete steps. Each step names the file it touches \
and what changes. Also describe the expected outcome and criteria to validate the result.";

pub const REFINE_SYSTEM_PROMPT: &str = "You are a plan reviewer. \
Improve the given implementation plan: fix missing or redundant steps and make each step precise. \
Keep the same JSON structure.";

pub const EVALUATE_SYSTEM_PROMPT: &str = "You are a code reviewer. \
Judge whether the proposed changes fully satisfy the analysed request. \
Report meetsRequirements, a confidence between 0 and 1, and concrete suggestedImprovements when something is missing.";

pub const GENERATE_SYSTEM_PROMPT: &str = "You are a coding agent that changes files one action at a time. \
Reply with EXACTLY ONE action per message, using this format:\n\n\
ACTION: EDIT_FILE\n\
FILE_PATH: <path of an existing file>\n\
EXPLANATION: <what you changed>\n\
CONTENT:\n\
```\n\
<the complete new content of the file>\n\
```\n\n\
ACTION: CREATE_FILE takes the same fields and creates a new file (parent directories are created).\n\
When all changes are done reply with:\n\n\
ACTION: COMPLETE\n\
SUMMARY: <short summary of everything you changed>\n\n\
Rules:\n\
- Always send the whole file content, never a fragment or a diff.\n\
- Never put more than one ACTION line in a reply.\n\
- After each action you receive feedback; use it to decide the next action.";

/// 出现多个动作时的澄清提示
pub const SINGLE_ACTION_REMINDER: &str = "Your reply contained more than one ACTION. \
Nothing was executed. Reply again with exactly ONE action directive.";

fn with_schema(prompt: &str, schema: String) -> String {
    format!(
        "{}\n\nRespond with a single JSON object (optionally in a ```json block) matching this schema:\n{}",
        prompt, schema
    )
}

pub fn analyze_system_prompt() -> String {
    with_schema(ANALYZE_SYSTEM_PROMPT, output_schema_json::<Understanding>())
}

pub fn plan_system_prompt() -> String {
    with_schema(PLAN_SYSTEM_PROMPT, output_schema_json::<GenerationPlan>())
}

pub fn refine_system_prompt() -> String {
    with_schema(REFINE_SYSTEM_PROMPT, output_schema_json::<GenerationPlan>())
}

pub fn evaluate_system_prompt() -> String {
    with_schema(EVALUATE_SYSTEM_PROMPT, output_schema_json::<Evaluation>())
}

/// 重试时附带的解析错误说明
pub fn parse_error_message(error: &str) -> String {
    format!(
        "Your previous reply could not be parsed: {}\nReply again with only the corrected JSON object.",
        error
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_are_distinct() {
        let all = [
            ANALYZE_SYSTEM_PROMPT,
            PLAN_SYSTEM_PROMPT,
            REFINE_SYSTEM_PROMPT,
            EVALUATE_SYSTEM_PROMPT,
            GENERATE_SYSTEM_PROMPT,
        ];
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                if i != j {
                    assert!(!a.starts_with(b), "{i} starts with {j}");
                }
            }
        }
    }

    #[test]
    fn test_schema_is_appended() {
        let p = plan_system_prompt();
        assert!(p.starts_with(PLAN_SYSTEM_PROMPT));
        assert!(p.contains("validationCriteria"));
    }
}
