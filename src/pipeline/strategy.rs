//! ReasoningStrategy：不带工具的第二次补全，细化已有计划（可选）

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::pipeline::prompts::refine_system_prompt;
use crate::pipeline::structured::complete_structured;
use crate::pipeline::{GenerationPlan, Understanding};

pub struct ReasoningStrategy {
    provider: LlmProvider,
}

impl ReasoningStrategy {
    pub fn new(provider: LlmProvider) -> Self {
        Self { provider }
    }

    pub async fn refine(
        &self,
        understanding: &Understanding,
        plan: &GenerationPlan,
        cancel: &CancellationToken,
    ) -> Result<GenerationPlan, AgentError> {
        let system = refine_system_prompt();
        let user = format!(
            "## Analysed request\n{}\n\n## Current plan\n{}\n",
            serde_json::to_string_pretty(understanding).unwrap_or_default(),
            serde_json::to_string_pretty(plan).unwrap_or_default()
        );
        let refined: GenerationPlan = complete_structured(&self.provider, "refine", cancel, || {
            CompletionRequest::new(system.clone(), user.clone())
        })
        .await?;
        tracing::debug!(before = plan.steps.len(), after = refined.steps.len(), "plan refined");
        Ok(refined)
    }
}
