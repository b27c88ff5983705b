//! Planner：Understanding -> GenerationPlan

use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::pipeline::prompts::plan_system_prompt;
use crate::pipeline::structured::complete_structured;
use crate::pipeline::{ContextManager, GenerationPlan, Understanding};
use crate::tools::ToolExecutor;

pub struct Planner {
    provider: LlmProvider,
    tools: Option<ToolExecutor>,
}

impl Planner {
    pub fn new(provider: LlmProvider) -> Self {
        Self { provider, tools: None }
    }

    pub fn with_tools(mut self, tools: ToolExecutor) -> Self {
        self.tools = Some(tools);
        self
    }

    /// 生成有序计划；与分析阶段同样的「重试一次」策略
    pub async fn create_plan(
        &self,
        understanding: &Understanding,
        context: &ContextManager,
        cancel: &CancellationToken,
    ) -> Result<GenerationPlan, AgentError> {
        let system = plan_system_prompt();
        let understanding_json = serde_json::to_string_pretty(understanding).unwrap_or_default();
        let user = format!(
            "{}\n## Analysed request\n{}\n",
            context.current_context_prompt(false),
            understanding_json
        );

        let plan: GenerationPlan = complete_structured(&self.provider, "plan", cancel, || {
            CompletionRequest::new(system.clone(), user.clone()).with_tools(self.tools.as_ref())
        })
        .await?;
        tracing::info!(steps = plan.steps.len(), "plan created");
        Ok(plan)
    }
}
