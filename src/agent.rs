//! Agent：按配置把各角色显式组装在一起
//!
//! create_agent 从配置创建 LLM 客户端（缺少 API Key 时返回 Config 错误）；
//! create_agent_with_client 接受外部客户端（测试中传入 MockLlmClient）。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{
    AgentError, CodeApplier, CodingOutcome, CodingRequest, InteractionHandler, Orchestrator, OrchestratorConfig,
    RunSupervisor,
};
use crate::llm::{
    create_deepseek_client, LlmClient, LlmProvider, OpenAiClient, RetryConfig, RetryingLlmClient,
};
use crate::memory::MessageLog;
use crate::pipeline::{
    ActionDrivenGenerator, ActionRegistry, ContextManager, EventSender, GeneratorConfig, Planner, Reasoner,
    ReasoningStrategy,
};
use crate::tools::{default_registry, StagedFiles, ToolExecutor};

/// 根据配置与环境变量创建 LLM 客户端（外层包一层重试）
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.llm.provider.to_lowercase();
    let client: Arc<dyn LlmClient> = match provider.as_str() {
        "deepseek" => {
            let key = std::env::var("DEEPSEEK_API_KEY")
                .map_err(|_| AgentError::Config("DEEPSEEK_API_KEY is not set".into()))?;
            let model = cfg
                .llm
                .deepseek
                .model
                .clone()
                .unwrap_or_else(|| cfg.llm.model.clone());
            tracing::info!("Using DeepSeek LLM ({})", model);
            Arc::new(create_deepseek_client(Some(&model), Some(&key)))
        }
        "openai" => {
            let key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| AgentError::Config("OPENAI_API_KEY is not set".into()))?;
            let model = cfg
                .llm
                .openai
                .model
                .clone()
                .unwrap_or_else(|| cfg.llm.model.clone());
            tracing::info!("Using OpenAI LLM ({})", model);
            Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, Some(&key)))
        }
        other => return Err(AgentError::Config(format!("unknown llm provider '{}'", other))),
    };

    let retry = RetryConfig {
        max_retries: cfg.llm.retry.max_retries,
        base_delay: Duration::from_millis(cfg.llm.retry.base_delay_ms),
    };
    Ok(Arc::new(RetryingLlmClient::new(client, retry)))
}

/// 组装好的编码智能体：编排器 + 上下文 + 运行监管
pub struct Agent {
    orchestrator: Orchestrator,
    context: ContextManager,
    supervisor: Arc<RunSupervisor>,
    provider: LlmProvider,
}

impl Agent {
    /// 处理一次请求；每次运行使用新的取消令牌
    pub async fn process(
        &mut self,
        request: &CodingRequest,
        events: Option<&EventSender>,
    ) -> Result<CodingOutcome, AgentError> {
        let cancel = self.supervisor.begin_run();
        self.orchestrator
            .run(request, &mut self.context, &cancel, events)
            .await
    }

    /// 供 Ctrl+C 等外部信号取消当前运行
    pub fn supervisor(&self) -> Arc<RunSupervisor> {
        self.supervisor.clone()
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ContextManager {
        &mut self.context
    }

    /// (prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.provider.token_usage()
    }
}

/// 从配置创建 Agent
pub fn create_agent(cfg: &AppConfig, interaction: Arc<dyn InteractionHandler>) -> Result<Agent, AgentError> {
    let client = create_llm_from_config(cfg)?;
    Ok(create_agent_with_client(cfg, client, interaction))
}

/// 使用给定 LLM 客户端创建 Agent
pub fn create_agent_with_client(
    cfg: &AppConfig,
    client: Arc<dyn LlmClient>,
    interaction: Arc<dyn InteractionHandler>,
) -> Agent {
    let workspace = cfg.app.workspace();
    let provider = LlmProvider::new(client)
        .with_temperature(cfg.llm.temperature)
        .with_max_tool_rounds(cfg.llm.max_tool_rounds)
        .with_request_timeout(Duration::from_secs(cfg.llm.timeouts.request));

    let orchestrator = build_orchestrator(cfg, &workspace, provider.clone(), interaction);
    let context = ContextManager::new(&workspace)
        .with_message_log(MessageLog::new(workspace.join(&cfg.app.message_log)))
        .with_max_prompt_messages(cfg.app.max_context_turns);

    tracing::info!(
        workspace = %workspace.display(),
        strategy = ?cfg.agent.strategy,
        "agent created"
    );
    Agent {
        orchestrator,
        context,
        supervisor: Arc::new(RunSupervisor::new()),
        provider,
    }
}

fn build_orchestrator(
    cfg: &AppConfig,
    workspace: &Path,
    provider: LlmProvider,
    interaction: Arc<dyn InteractionHandler>,
) -> Orchestrator {
    let staged = StagedFiles::new();
    let tools = ToolExecutor::new(
        default_registry(
            workspace,
            staged.clone(),
            cfg.tools.max_file_bytes,
            cfg.tools.max_search_results,
        ),
        cfg.tools.tool_timeout_secs,
    );

    let reasoner = Reasoner::new(provider.clone())
        .with_tools(tools.clone())
        .with_full_outline(cfg.agent.include_full_outline);
    let planner = Planner::new(provider.clone()).with_tools(tools.clone());
    let generator = ActionDrivenGenerator::new(
        provider.clone(),
        ActionRegistry::new(),
        GeneratorConfig {
            max_turns: cfg.agent.max_action_turns,
            max_consecutive_failures: cfg.agent.max_consecutive_failures,
            include_full_outline: cfg.agent.include_full_outline,
            temperature: None,
        },
    )
    .with_tools(tools);

    Orchestrator::new(
        reasoner,
        planner,
        generator,
        CodeApplier::new(workspace),
        interaction,
        OrchestratorConfig {
            strategy: cfg.agent.strategy,
            max_iterations: cfg.agent.max_iterations,
            refine_plan: cfg.agent.refine_plan,
        },
    )
    .with_strategy(ReasoningStrategy::new(provider))
    .with_staged_files(staged)
}
