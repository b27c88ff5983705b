//! 动作驱动的代码生成循环
//!
//! 每轮：拼 prompt（上下文 + 计划 + 上一轮反馈）→ 请求恰好一个动作 → 解析 → 执行 → 生成反馈。
//! 收到 Complete（包括解析失败合成的 Complete）即终止；另有轮数上限与连续失败上限，
//! 触发上限时合成 Complete 并把结果标记为失败。

use tokio_util::sync::CancellationToken;

use crate::core::{cancellable, AgentError};
use crate::llm::{CompletionRequest, LlmProvider};
use crate::memory::Message;
use crate::pipeline::action_parser::{count_actions_in_response, first_action_block, parse_response};
use crate::pipeline::actions::{synthetic_complete, ActionEnv, ActionRegistry, LlmAction};
use crate::pipeline::events::{send_event, EventSender, PipelineEvent};
use crate::pipeline::prompts::{GENERATE_SYSTEM_PROMPT, SINGLE_ACTION_REMINDER};
use crate::pipeline::{CodingResult, ContextManager, GenerationPlan, Workspace};
use crate::tools::ToolExecutor;

/// 生成循环配置
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// 单次生成最多请求多少个动作
    pub max_turns: usize,
    /// 连续执行失败达到此数时终止
    pub max_consecutive_failures: usize,
    pub include_full_outline: bool,
    pub temperature: Option<f32>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_turns: 25,
            max_consecutive_failures: 3,
            include_full_outline: true,
            temperature: None,
        }
    }
}

/// 循环状态
#[derive(Debug, Clone, PartialEq)]
enum LoopState {
    AwaitingAction { feedback: String },
    Terminal { summary: String, success: bool },
}

/// 一次生成所需的可变环境
pub struct GenerationSession<'a> {
    pub context: &'a mut ContextManager,
    pub workspace: &'a mut Workspace,
    pub instruction: &'a str,
    pub plan: Option<&'a GenerationPlan>,
    /// 第一轮的反馈（批处理策略中为上一轮评估的改进建议）
    pub initial_feedback: String,
    pub cancel: &'a CancellationToken,
    pub events: Option<&'a EventSender>,
}

pub fn success_feedback(action_type: &str, summary: &str) -> String {
    format!("{} executed successfully: {}", action_type, summary)
}

pub fn failure_feedback(action_type: &str) -> String {
    format!(
        "Failed to execute {}. Please try again with corrected parameters.",
        action_type
    )
}

pub struct ActionDrivenGenerator {
    provider: LlmProvider,
    registry: ActionRegistry,
    tools: Option<ToolExecutor>,
    config: GeneratorConfig,
}

impl ActionDrivenGenerator {
    pub fn new(provider: LlmProvider, registry: ActionRegistry, config: GeneratorConfig) -> Self {
        Self {
            provider,
            registry,
            tools: None,
            config,
        }
    }

    pub fn with_tools(mut self, tools: ToolExecutor) -> Self {
        self.tools = Some(tools);
        self
    }

    fn system_prompt(&self) -> String {
        format!(
            "{}\n\nAvailable action types: {}",
            GENERATE_SYSTEM_PROMPT,
            self.registry.action_types().join(", ")
        )
    }

    fn user_prompt(&self, session: &GenerationSession<'_>, feedback: &str) -> String {
        let mut s = session
            .context
            .current_context_prompt(self.config.include_full_outline);
        if let Some(plan) = session.plan {
            s.push('\n');
            s.push_str(&plan.to_prompt_section());
        }
        let history = session.context.history_prompt();
        if !history.is_empty() {
            s.push('\n');
            s.push_str(&history);
        }
        s.push_str(&format!("\n## Instruction\n{}\n", session.instruction));
        if !feedback.is_empty() {
            s.push_str(&format!("\n## Feedback\n{}\n", feedback));
        }
        s.push_str("\nReply with exactly one action.");
        s
    }

    fn request<'t>(&'t self, system: &str, user: &str, history: Vec<Message>) -> CompletionRequest<'t> {
        let mut req = CompletionRequest::new(system, user)
            .with_history(history)
            .with_tools(self.tools.as_ref());
        if let Some(t) = self.config.temperature {
            req = req.with_temperature(t);
        }
        req
    }

    /// 请求一个动作；多动作时丢弃回复并澄清一次，仍违规则只取第一个指令块
    async fn request_action(
        &self,
        user: &str,
        cancel: &CancellationToken,
        events: Option<&EventSender>,
    ) -> Result<String, AgentError> {
        let system = self.system_prompt();
        let reply = cancellable(cancel, self.provider.complete_text(self.request(&system, user, Vec::new()))).await?;

        let count = count_actions_in_response(&reply);
        if count <= 1 {
            return Ok(reply);
        }
        tracing::info!(count, "reply contained several actions, asking for exactly one");
        send_event(events, PipelineEvent::MultiActionRejected { count });

        let history = vec![Message::user(user), Message::agent(reply)];
        let second = cancellable(
            cancel,
            self.provider
                .complete_text(self.request(&system, SINGLE_ACTION_REMINDER, history)),
        )
        .await?;

        let count = count_actions_in_response(&second);
        if count > 1 {
            tracing::warn!(count, "repeated multi-action reply, using the first action only");
            return Ok(first_action_block(&second).to_string());
        }
        Ok(second)
    }

    fn build_action(&self, reply: &str) -> LlmAction {
        let parsed = parse_response(reply);
        match self.registry.build(&parsed) {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(action = %parsed.action_type, error = %e, "could not build action, finishing");
                synthetic_complete(reply, &e.to_string())
            }
        }
    }

    /// 运行循环直到终止；只有 LLM 传输错误与取消会返回 Err
    pub async fn run(&self, session: GenerationSession<'_>) -> Result<CodingResult, AgentError> {
        let mut session = session;
        let mut state = LoopState::AwaitingAction {
            feedback: std::mem::take(&mut session.initial_feedback),
        };
        let mut turn = 0;
        let mut failures = 0;
        tracing::debug!(mode = ?session.workspace.mode(), max_turns = self.config.max_turns, "generation started");

        let (summary, success) = loop {
            let feedback = match state {
                LoopState::Terminal { summary, success } => break (summary, success),
                LoopState::AwaitingAction { feedback } => feedback,
            };

            if turn >= self.config.max_turns {
                tracing::warn!(turns = turn, "action turn limit reached");
                state = LoopState::Terminal {
                    summary: format!("Stopped after {} action turns without COMPLETE.", turn),
                    success: false,
                };
                continue;
            }
            turn += 1;
            send_event(session.events, PipelineEvent::Thinking { turn });

            let user = self.user_prompt(&session, &feedback);
            let reply = self.request_action(&user, session.cancel, session.events).await?;
            let action = self.build_action(&reply);
            let action_type = action.type_name().to_string();
            tracing::info!(turn, action = %action_type, "action received");
            send_event(
                session.events,
                PipelineEvent::ActionReceived {
                    action: action_type.clone(),
                    summary: action.summary(),
                },
            );
            session
                .context
                .add_message(Message::agent(format!("{}: {}", action_type, action.summary())));

            let mut env = ActionEnv {
                workspace: &mut *session.workspace,
                context: &mut *session.context,
            };
            state = match action.process(&mut env).await {
                Ok(summary) if action.is_terminal() => LoopState::Terminal { summary, success: true },
                Ok(summary) => {
                    failures = 0;
                    let feedback = success_feedback(&action_type, &summary);
                    send_event(
                        session.events,
                        PipelineEvent::ActionFeedback {
                            feedback: feedback.clone(),
                            success: true,
                        },
                    );
                    LoopState::AwaitingAction { feedback }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(turn, action = %action_type, error = %e, failures, "action failed");
                    let feedback = failure_feedback(&action_type);
                    send_event(
                        session.events,
                        PipelineEvent::ActionFeedback {
                            feedback: feedback.clone(),
                            success: false,
                        },
                    );
                    if failures >= self.config.max_consecutive_failures {
                        LoopState::Terminal {
                            summary: format!(
                                "Stopped after {} consecutive failed actions. Last error: {}",
                                failures, e
                            ),
                            success: false,
                        }
                    } else {
                        LoopState::AwaitingAction { feedback }
                    }
                }
            };
        };

        tracing::info!(turns = turn, success, "generation finished");
        Ok(CodingResult {
            file_changes: session.workspace.file_changes(),
            explanation: summary,
            success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::llm::MockLlmClient;
    use crate::memory::ContextFile;
    use crate::pipeline::FileChange;
    use crate::tools::{default_registry, StagedFiles};

    fn generator(mock: Arc<MockLlmClient>, config: GeneratorConfig) -> ActionDrivenGenerator {
        ActionDrivenGenerator::new(LlmProvider::new(mock), ActionRegistry::new(), config)
    }

    fn last_user(messages: &[Message]) -> &str {
        messages.last().map(|m| m.content.as_str()).unwrap_or("")
    }

    #[tokio::test]
    async fn test_edit_then_complete() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.kt");
        std::fs::write(&file, "fun foo() = 1\n").unwrap();
        let edit = format!(
            "ACTION: EDIT_FILE\nFILE_PATH: {}\nEXPLANATION: rename\nCONTENT:\n```kotlin\nfun bar() = 1\n```",
            file.display()
        );
        let mock = Arc::new(MockLlmClient::new().with_replies(
            GENERATE_SYSTEM_PROMPT,
            [edit.as_str(), "ACTION: COMPLETE\nSUMMARY: renamed foo to bar"],
        ));
        let gen = generator(mock.clone(), GeneratorConfig::default());

        let mut context = ContextManager::new(dir.path());
        let mut workspace = Workspace::staged(dir.path());
        let cancel = CancellationToken::new();
        let result = gen
            .run(GenerationSession {
                context: &mut context,
                workspace: &mut workspace,
                instruction: "rename foo to bar",
                plan: None,
                initial_feedback: String::new(),
                cancel: &cancel,
                events: None,
            })
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.explanation, "renamed foo to bar");
        assert_eq!(
            result.file_changes,
            vec![FileChange::modify(
                file.to_string_lossy(),
                "fun foo() = 1\n",
                "fun bar() = 1\n"
            )]
        );
        // 暂存模式不写盘
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "fun foo() = 1\n");

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        let second = last_user(&requests[1]);
        assert!(second.contains(&success_feedback(
            "EDIT_FILE",
            &format!("Edited {}: rename", file.display())
        )));
        // 上一轮的修改在下一轮 prompt 中可见
        assert!(second.contains("fun bar() = 1"));
        assert_eq!(
            context.file(&file.to_string_lossy()).map(|f| f.content.as_str()),
            Some("fun bar() = 1\n")
        );
    }

    #[tokio::test]
    async fn test_staged_edit_visible_to_read_file_tool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "OLD\n").unwrap();
        let staged = StagedFiles::new();
        let tools = ToolExecutor::new(default_registry(dir.path(), staged.clone(), 1 << 20, 50), 5);
        let mock = Arc::new(MockLlmClient::new().with_replies(
            GENERATE_SYSTEM_PROMPT,
            [
                "ACTION: EDIT_FILE\nFILE_PATH: a.txt\nEXPLANATION: update\nCONTENT:\nNEW\n```",
                r#"{"tool": "read_file", "args": {"path": "a.txt"}}"#,
                "ACTION: COMPLETE\nSUMMARY: updated a.txt",
            ],
        ));
        let gen = generator(mock.clone(), GeneratorConfig::default()).with_tools(tools);

        let mut context = ContextManager::new(dir.path());
        let mut workspace = Workspace::staged(dir.path()).with_staged_files(staged.clone());
        let cancel = CancellationToken::new();
        let result = gen
            .run(GenerationSession {
                context: &mut context,
                workspace: &mut workspace,
                instruction: "update a.txt",
                plan: None,
                initial_feedback: String::new(),
                cancel: &cancel,
                events: None,
            })
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.file_changes.len(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "OLD\n");

        let requests = mock.requests();
        assert_eq!(requests.len(), 3);
        let observation = last_user(&requests[2]);
        assert!(observation.starts_with("Observation from read_file:"));
        assert!(observation.contains("NEW"));
        assert!(!observation.contains("OLD"));

        drop(workspace);
        assert!(staged.entries().is_empty());
    }

    #[tokio::test]
    async fn test_multi_action_reply_is_clarified() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockLlmClient::new().with_replies(
            GENERATE_SYSTEM_PROMPT,
            [
                "ACTION: CREATE_FILE\nFILE_PATH: x.txt\nCONTENT:\nx\n```\nACTION: COMPLETE\nSUMMARY: both",
                "ACTION: COMPLETE\nSUMMARY: nothing to do",
            ],
        ));
        let gen = generator(mock.clone(), GeneratorConfig::default());
        let mut context = ContextManager::new(dir.path());
        let mut workspace = Workspace::direct(dir.path());
        let cancel = CancellationToken::new();
        let result = gen
            .run(GenerationSession {
                context: &mut context,
                workspace: &mut workspace,
                instruction: "noop",
                plan: None,
                initial_feedback: String::new(),
                cancel: &cancel,
                events: None,
            })
            .await
            .unwrap();

        assert_eq!(result.explanation, "nothing to do");
        assert!(!dir.path().join("x.txt").exists());
        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(last_user(&requests[1]), SINGLE_ACTION_REMINDER);
    }

    #[tokio::test]
    async fn test_repeated_multi_action_uses_first_block() {
        let dir = tempfile::tempdir().unwrap();
        let both = "ACTION: CREATE_FILE\nFILE_PATH: x.txt\nCONTENT:\nx\n```\nACTION: COMPLETE\nSUMMARY: both";
        let mock = Arc::new(MockLlmClient::new().with_replies(
            GENERATE_SYSTEM_PROMPT,
            [both, both, "ACTION: COMPLETE\nSUMMARY: done"],
        ));
        let gen = generator(mock, GeneratorConfig::default());
        let mut context = ContextManager::new(dir.path());
        let mut workspace = Workspace::direct(dir.path());
        let cancel = CancellationToken::new();
        let result = gen
            .run(GenerationSession {
                context: &mut context,
                workspace: &mut workspace,
                instruction: "create x",
                plan: None,
                initial_feedback: String::new(),
                cancel: &cancel,
                events: None,
            })
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("x.txt")).unwrap(), "x\n");
        assert_eq!(result.explanation, "done");
    }

    #[tokio::test]
    async fn test_unknown_action_synthesises_complete() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockLlmClient::new().with_replies(GENERATE_SYSTEM_PROMPT, ["I am not sure what to do."]));
        let gen = generator(mock.clone(), GeneratorConfig::default());
        let mut context = ContextManager::new(dir.path());
        let mut workspace = Workspace::direct(dir.path());
        let cancel = CancellationToken::new();
        let result = gen
            .run(GenerationSession {
                context: &mut context,
                workspace: &mut workspace,
                instruction: "x",
                plan: None,
                initial_feedback: String::new(),
                cancel: &cancel,
                events: None,
            })
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.explanation.contains("I am not sure what to do."));
        assert!(result.file_changes.is_empty());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_turn_cap_and_feedback_events() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockLlmClient::new().with_replies(
            GENERATE_SYSTEM_PROMPT,
            ["ACTION: CREATE_FILE\nFILE_PATH: loop.txt\nCONTENT:\nagain\n```"],
        ));
        let config = GeneratorConfig {
            max_turns: 3,
            ..GeneratorConfig::default()
        };
        let gen = generator(mock.clone(), config);
        let mut context = ContextManager::new(dir.path());
        let mut workspace = Workspace::direct(dir.path());
        let cancel = CancellationToken::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let result = gen
            .run(GenerationSession {
                context: &mut context,
                workspace: &mut workspace,
                instruction: "x",
                plan: None,
                initial_feedback: String::new(),
                cancel: &cancel,
                events: Some(&tx),
            })
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(mock.requests().len(), 3);
        assert_eq!(result.file_changes.len(), 1);

        let mut thinking = 0;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, PipelineEvent::Thinking { .. }) {
                thinking += 1;
            }
        }
        assert_eq!(thinking, 3);
    }

    #[tokio::test]
    async fn test_consecutive_failures_stop_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blocker"), "").unwrap();
        let mock = Arc::new(MockLlmClient::new().with_replies(
            GENERATE_SYSTEM_PROMPT,
            ["ACTION: CREATE_FILE\nFILE_PATH: blocker/inner.txt\nCONTENT:\nx\n```"],
        ));
        let gen = generator(mock.clone(), GeneratorConfig::default());
        let mut context = ContextManager::new(dir.path());
        context.update_files([ContextFile::new("note", "n")]);
        let mut workspace = Workspace::direct(dir.path());
        let cancel = CancellationToken::new();
        let result = gen
            .run(GenerationSession {
                context: &mut context,
                workspace: &mut workspace,
                instruction: "x",
                plan: None,
                initial_feedback: String::new(),
                cancel: &cancel,
                events: None,
            })
            .await
            .unwrap();

        assert!(!result.success);
        let requests = mock.requests();
        assert_eq!(requests.len(), 3);
        assert!(last_user(&requests[1]).contains(&failure_feedback("CREATE_FILE")));
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let gen = generator(Arc::new(MockLlmClient::new()), GeneratorConfig::default());
        let mut context = ContextManager::new(dir.path());
        let mut workspace = Workspace::direct(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gen
            .run(GenerationSession {
                context: &mut context,
                workspace: &mut workspace,
                instruction: "x",
                plan: None,
                initial_feedback: String::new(),
                cancel: &cancel,
                events: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
