//! 编排器：Reasoner → Planner → Generator → 评估 → 人工确认 → 应用
//!
//! 批处理（默认）：最多 max_iterations 轮生成 + 评估，生成在暂存模式下进行；
//! 评估通过后展示 diff，确认后才由 CodeApplier 写盘。拒绝或轮数用尽都是正常结束。
//! 增量：生成循环直接写盘，不做确认，结束后做一次评估只用于给出置信度。

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::{cancellable, AgentError, CodeApplier, InteractionHandler, InteractionMessage, PipelinePhase};
use crate::memory::Message;
use crate::pipeline::events::send_event;
use crate::pipeline::{
    render_diff, ActionDrivenGenerator, CodingResult, ContextManager, EventSender, Evaluation, GenerationPlan,
    GenerationSession, PipelineEvent, Planner, Reasoner, ReasoningStrategy, Understanding, Workspace,
};
use crate::tools::StagedFiles;

/// 拒绝时的固定置信度
pub const REJECTED_CONFIDENCE: f64 = 0.9;
/// 轮数用尽时的固定置信度
pub const MAX_ITERATIONS_CONFIDENCE: f64 = 0.7;

const REJECTED_EXPLANATION: &str = "Changes rejected by user.";

/// 编排策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Batch,
    Incremental,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub strategy: Strategy,
    pub max_iterations: usize,
    pub refine_plan: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Batch,
            max_iterations: 2,
            refine_plan: false,
        }
    }
}

/// 一次编码请求
#[derive(Debug, Clone, Default)]
pub struct CodingRequest {
    pub instruction: String,
    /// 需要预先放入上下文的文件
    pub files: Vec<PathBuf>,
}

impl CodingRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = PathBuf>) -> Self {
        self.files.extend(files);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// 确认并写盘
    Applied,
    /// 用户拒绝，未写盘
    Rejected,
    /// 评估始终不通过
    MaxIterationsExceeded,
    /// 增量模式结束，或无需修改
    Completed,
}

/// 编排结果
#[derive(Debug, Clone, Serialize)]
pub struct CodingOutcome {
    pub result: CodingResult,
    pub status: OutcomeStatus,
    pub confidence: f64,
    pub next_steps: Vec<String>,
    pub iterations: usize,
    pub understanding: Option<Understanding>,
    pub plan: Option<GenerationPlan>,
}

fn generic_next_steps() -> Vec<String> {
    vec![
        "Review the proposed changes manually before relying on them.".to_string(),
        "Add more detail or relevant files to the instruction and run again.".to_string(),
    ]
}

/// 把评估建议转成下一轮的初始反馈
fn improvements_feedback(evaluation: &Evaluation) -> String {
    let mut s = String::from(
        "The previous attempt did not fully meet the requirements. Continue from the current file contents.",
    );
    if !evaluation.suggested_improvements.is_empty() {
        s.push_str("\nSuggested improvements:");
        for item in &evaluation.suggested_improvements {
            s.push_str(&format!("\n- {}", item));
        }
    }
    s
}

pub struct Orchestrator {
    reasoner: Reasoner,
    planner: Planner,
    strategy: Option<ReasoningStrategy>,
    generator: ActionDrivenGenerator,
    applier: CodeApplier,
    interaction: Arc<dyn InteractionHandler>,
    config: OrchestratorConfig,
    /// 与生成阶段的只读工具共享的暂存内容
    staged_files: StagedFiles,
}

/// 一次运行中各阶段共享的只读部分
struct RunScope<'a> {
    instruction: &'a str,
    understanding: &'a Understanding,
    plan: &'a GenerationPlan,
    cancel: &'a CancellationToken,
    events: Option<&'a EventSender>,
}

fn enter_phase(events: Option<&EventSender>, phase: PipelinePhase) {
    tracing::info!(phase = phase.label(), "pipeline phase");
    send_event(events, PipelineEvent::PhaseChanged { phase });
}

impl Orchestrator {
    pub fn new(
        reasoner: Reasoner,
        planner: Planner,
        generator: ActionDrivenGenerator,
        applier: CodeApplier,
        interaction: Arc<dyn InteractionHandler>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            reasoner,
            planner,
            strategy: None,
            generator,
            applier,
            interaction,
            config,
            staged_files: StagedFiles::new(),
        }
    }

    /// 批处理生成期间把暂存内容共享给工具（与 default_registry 传入同一个 StagedFiles）
    pub fn with_staged_files(mut self, staged: StagedFiles) -> Self {
        self.staged_files = staged;
        self
    }

    /// 启用计划细化（只有 refine_plan 为 true 时才会调用）
    pub fn with_strategy(mut self, strategy: ReasoningStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// 处理一次请求
    pub async fn run(
        &self,
        request: &CodingRequest,
        context: &mut ContextManager,
        cancel: &CancellationToken,
        events: Option<&EventSender>,
    ) -> Result<CodingOutcome, AgentError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, strategy = ?self.config.strategy, "run started");

        let outcome = self.run_inner(request, context, cancel, events).await;
        match &outcome {
            Ok(o) => {
                tracing::info!(run_id = %run_id, status = ?o.status, confidence = o.confidence, "run finished");
                context.add_message(Message::agent(format!("{:?}: {}", o.status, o.result.explanation)));
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "run failed");
                send_event(events, PipelineEvent::Error { text: e.to_string() });
                enter_phase(events, PipelinePhase::Failed);
            }
        }
        outcome
    }

    async fn run_inner(
        &self,
        request: &CodingRequest,
        context: &mut ContextManager,
        cancel: &CancellationToken,
        events: Option<&EventSender>,
    ) -> Result<CodingOutcome, AgentError> {
        context.add_request_files(&request.files).await;
        context.add_message(Message::user(request.instruction.clone()));

        enter_phase(events, PipelinePhase::Analyzing);
        let understanding = self
            .reasoner
            .analyze_request(&request.instruction, context, cancel)
            .await?;

        enter_phase(events, PipelinePhase::Planning);
        let mut plan = self.planner.create_plan(&understanding, context, cancel).await?;
        if self.config.refine_plan {
            if let Some(strategy) = &self.strategy {
                match strategy.refine(&understanding, &plan, cancel).await {
                    Ok(refined) => plan = refined,
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => tracing::warn!(error = %e, "plan refinement failed, keeping original plan"),
                }
            }
        }

        let scope = RunScope {
            instruction: &request.instruction,
            understanding: &understanding,
            plan: &plan,
            cancel,
            events,
        };
        let mut outcome = match self.config.strategy {
            Strategy::Batch => self.run_batch(&scope, context).await?,
            Strategy::Incremental => self.run_incremental(&scope, context).await?,
        };
        outcome.understanding = Some(understanding);
        outcome.plan = Some(plan);
        Ok(outcome)
    }

    async fn run_batch(&self, scope: &RunScope<'_>, context: &mut ContextManager) -> Result<CodingOutcome, AgentError> {
        let max_iterations = self.config.max_iterations.max(1);
        // 暂存的修改跨轮累积
        let mut workspace = Workspace::staged(context.workspace()).with_staged_files(self.staged_files.clone());
        let mut feedback = String::new();
        let mut last: Option<(CodingResult, Evaluation)> = None;

        for iteration in 1..=max_iterations {
            enter_phase(scope.events, PipelinePhase::Generating);
            let result = self
                .generator
                .run(GenerationSession {
                    context: &mut *context,
                    workspace: &mut workspace,
                    instruction: scope.instruction,
                    plan: Some(scope.plan),
                    initial_feedback: std::mem::take(&mut feedback),
                    cancel: scope.cancel,
                    events: scope.events,
                })
                .await?;

            enter_phase(scope.events, PipelinePhase::Evaluating);
            let evaluation = self.reasoner.evaluate(scope.understanding, &result, scope.cancel).await?;
            tracing::info!(
                iteration,
                meets = evaluation.meets_requirements,
                changes = result.file_changes.len(),
                "iteration evaluated"
            );
            send_event(
                scope.events,
                PipelineEvent::Evaluation {
                    iteration,
                    meets_requirements: evaluation.meets_requirements,
                    confidence: evaluation.confidence,
                },
            );

            if evaluation.meets_requirements {
                if result.file_changes.is_empty() {
                    enter_phase(scope.events, PipelinePhase::Completed);
                    return Ok(CodingOutcome {
                        confidence: evaluation.confidence,
                        next_steps: evaluation.suggested_improvements,
                        result,
                        status: OutcomeStatus::Completed,
                        iterations: iteration,
                        understanding: None,
                        plan: None,
                    });
                }
                return self.confirm_and_apply(result, evaluation, iteration, scope).await;
            }

            feedback = improvements_feedback(&evaluation);
            last = Some((result, evaluation));
        }

        enter_phase(scope.events, PipelinePhase::MaxIterationsExceeded);
        let (result, evaluation) = last.unwrap_or_else(|| {
            (
                CodingResult::default(),
                Evaluation {
                    meets_requirements: false,
                    confidence: 0.0,
                    suggested_improvements: Vec::new(),
                },
            )
        });
        let mut next_steps = generic_next_steps();
        next_steps.extend(evaluation.suggested_improvements);
        Ok(CodingOutcome {
            result,
            status: OutcomeStatus::MaxIterationsExceeded,
            confidence: MAX_ITERATIONS_CONFIDENCE,
            next_steps,
            iterations: max_iterations,
            understanding: None,
            plan: None,
        })
    }

    /// 展示 diff 与说明，确认后写盘；拒绝则不产生任何写入
    async fn confirm_and_apply(
        &self,
        result: CodingResult,
        evaluation: Evaluation,
        iteration: usize,
        scope: &RunScope<'_>,
    ) -> Result<CodingOutcome, AgentError> {
        enter_phase(scope.events, PipelinePhase::Confirming);
        let statement = format!(
            "Proposed changes:\n{}\nExplanation:\n{}",
            render_diff(&result.file_changes),
            result.explanation
        );
        cancellable(
            scope.cancel,
            self.interaction.interact(InteractionMessage::Statement(statement)),
        )
        .await?;
        let approved = cancellable(scope.cancel, self.interaction.confirm("Apply these changes?")).await?;

        if !approved {
            enter_phase(scope.events, PipelinePhase::Rejected);
            return Ok(CodingOutcome {
                result: CodingResult {
                    file_changes: Vec::new(),
                    explanation: REJECTED_EXPLANATION.to_string(),
                    success: false,
                },
                status: OutcomeStatus::Rejected,
                confidence: REJECTED_CONFIDENCE,
                next_steps: vec!["Refine the instruction and run again.".to_string()],
                iterations: iteration,
                understanding: None,
                plan: None,
            });
        }

        enter_phase(scope.events, PipelinePhase::Applying);
        let written = self.applier.apply(&result.file_changes).await?;
        tracing::info!(files = written.len(), "changes applied");
        enter_phase(scope.events, PipelinePhase::Applied);
        Ok(CodingOutcome {
            confidence: evaluation.confidence,
            next_steps: evaluation.suggested_improvements,
            result,
            status: OutcomeStatus::Applied,
            iterations: iteration,
            understanding: None,
            plan: None,
        })
    }

    async fn run_incremental(
        &self,
        scope: &RunScope<'_>,
        context: &mut ContextManager,
    ) -> Result<CodingOutcome, AgentError> {
        let mut workspace = Workspace::direct(context.workspace());
        enter_phase(scope.events, PipelinePhase::Generating);
        let result = self
            .generator
            .run(GenerationSession {
                context: &mut *context,
                workspace: &mut workspace,
                instruction: scope.instruction,
                plan: Some(scope.plan),
                initial_feedback: String::new(),
                cancel: scope.cancel,
                events: scope.events,
            })
            .await?;

        enter_phase(scope.events, PipelinePhase::Evaluating);
        let evaluation = self.reasoner.evaluate(scope.understanding, &result, scope.cancel).await?;
        send_event(
            scope.events,
            PipelineEvent::Evaluation {
                iteration: 1,
                meets_requirements: evaluation.meets_requirements,
                confidence: evaluation.confidence,
            },
        );
        enter_phase(scope.events, PipelinePhase::Completed);

        let next_steps = if evaluation.suggested_improvements.is_empty() {
            generic_next_steps()
        } else {
            evaluation.suggested_improvements
        };
        Ok(CodingOutcome {
            result,
            status: OutcomeStatus::Completed,
            confidence: evaluation.confidence,
            next_steps,
            iterations: 1,
            understanding: None,
            plan: None,
        })
    }
}
