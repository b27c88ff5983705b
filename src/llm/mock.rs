//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按 system prompt 前缀匹配脚本：每个前缀一条回复队列，依次弹出，耗尽后重复最后一条；
//! 没有匹配脚本时返回 fallback。记录所有请求，便于断言各阶段调用次数。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{CompletionOptions, LlmClient, LlmError};
use crate::memory::{Message, Role};

struct Script {
    system_prefix: String,
    replies: VecDeque<Result<String, LlmError>>,
    last: Option<Result<String, LlmError>>,
}

/// 脚本化 Mock 客户端
pub struct MockLlmClient {
    scripts: Mutex<Vec<Script>>,
    fallback: String,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            fallback: "ACTION: COMPLETE\nSUMMARY: Mock LLM has no scripted reply".to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 为以 system_prefix 开头的 system prompt 追加回复
    pub fn with_replies<I, S>(self, system_prefix: &str, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for reply in replies {
            self.push(system_prefix, Ok(reply.into()));
        }
        self
    }

    /// 为以 system_prefix 开头的 system prompt 追加一次失败
    pub fn with_error(self, system_prefix: &str, err: LlmError) -> Self {
        self.push(system_prefix, Err(err));
        self
    }

    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = reply.into();
        self
    }

    fn push(&self, system_prefix: &str, reply: Result<String, LlmError>) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        match scripts.iter_mut().find(|s| s.system_prefix == system_prefix) {
            Some(script) => script.replies.push_back(reply),
            None => scripts.push(Script {
                system_prefix: system_prefix.to_string(),
                replies: VecDeque::from([reply]),
                last: None,
            }),
        }
    }

    /// 所有请求（每个请求为完整消息列表）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// system prompt 以 system_prefix 开头的请求数
    pub fn calls_matching(&self, system_prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|msgs| system_of(msgs).starts_with(system_prefix))
            .count()
    }
}

fn system_of(messages: &[Message]) -> &str {
    messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        let system = system_of(messages);
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        let Some(script) = scripts
            .iter_mut()
            .find(|s| system.starts_with(&s.system_prefix))
        else {
            return Ok(self.fallback.clone());
        };
        match script.replies.pop_front() {
            Some(reply) => {
                script.last = Some(reply.clone());
                reply
            }
            None => script
                .last
                .clone()
                .unwrap_or_else(|| Ok(self.fallback.clone())),
        }
    }
}
