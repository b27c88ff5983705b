//! Reasoner：指令 -> Understanding；以及对生成结果的评估（Evaluation）

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::pipeline::prompts::{analyze_system_prompt, evaluate_system_prompt};
use crate::pipeline::structured::complete_structured;
use crate::pipeline::{render_diff, CodingResult, ContextManager, Evaluation, Understanding};
use crate::tools::ToolExecutor;

pub struct Reasoner {
    provider: LlmProvider,
    tools: Option<ToolExecutor>,
    include_full_outline: bool,
}

impl Reasoner {
    pub fn new(provider: LlmProvider) -> Self {
        Self {
            provider,
            tools: None,
            include_full_outline: true,
        }
    }

    /// 分析阶段可用的工具（模型可中途读取缺失文件）
    pub fn with_tools(mut self, tools: ToolExecutor) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_full_outline(mut self, include: bool) -> Self {
        self.include_full_outline = include;
        self
    }

    /// 理解请求：一次带工具的结构化补全，解析失败重试一次
    pub async fn analyze_request(
        &self,
        instruction: &str,
        context: &ContextManager,
        cancel: &CancellationToken,
    ) -> Result<Understanding, AgentError> {
        let system = analyze_system_prompt();
        let mut user = context.current_context_prompt(self.include_full_outline);
        let history = context.history_prompt();
        if !history.is_empty() {
            user.push('\n');
            user.push_str(&history);
        }
        user.push_str(&format!("\n## Instruction\n{}\n", instruction));

        let understanding: Understanding = complete_structured(&self.provider, "analyze", cancel, || {
            CompletionRequest::new(system.clone(), user.clone()).with_tools(self.tools.as_ref())
        })
        .await?;
        let understanding = understanding.normalized();
        tracing::info!(
            objective = %understanding.objective,
            features = understanding.required_features.len(),
            "request analysed"
        );
        Ok(understanding)
    }

    /// 评估一次生成结果是否满足 Understanding
    pub async fn evaluate(
        &self,
        understanding: &Understanding,
        result: &CodingResult,
        cancel: &CancellationToken,
    ) -> Result<Evaluation, AgentError> {
        let system = evaluate_system_prompt();
        let understanding_json = serde_json::to_string_pretty(understanding).unwrap_or_default();
        let diff = render_diff(&result.file_changes);
        let user = format!(
            "## Analysed request\n{}\n\n## Proposed changes\n{}\n## Explanation\n{}\n",
            understanding_json,
            if diff.is_empty() { "(no changes)\n".to_string() } else { diff },
            result.explanation
        );

        let evaluation: Evaluation = complete_structured(&self.provider, "evaluate", cancel, || {
            CompletionRequest::new(system.clone(), user.clone())
        })
        .await?;
        let evaluation = evaluation.normalized();
        tracing::info!(
            meets = evaluation.meets_requirements,
            confidence = evaluation.confidence,
            "generation evaluated"
        );
        Ok(evaluation)
    }
}
