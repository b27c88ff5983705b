//! 结构化补全 Provider
//!
//! 在 LlmClient 之上实现「带工具调用的结构化补全」：
//! 1. 若请求带有可用工具，把工具声明与调用格式拼到 system prompt 末尾；
//! 2. 模型回复恰好是 `{"tool": "...", "args": {...}}` 且工具已注册时，同步执行工具、写回 Observation 并继续；
//! 3. 模型给出不含工具调用的回复后返回最终文本，或将其中的 JSON 转为目标类型（失败为 LlmError::Conversion）。

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::llm::{CompletionOptions, LlmClient, LlmError};
use crate::memory::Message;
use crate::tools::{tool_call_schema_json, ToolExecutor};

/// 模型发起的工具调用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// 一次补全请求：system prompt + 历史 + 本轮 user 消息 + 可选工具
pub struct CompletionRequest<'a> {
    pub system_prompt: String,
    pub history: Vec<Message>,
    pub user_message: String,
    pub tools: Option<&'a ToolExecutor>,
    pub temperature: Option<f32>,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(system_prompt: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            user_message: user_message.into(),
            tools: None,
            temperature: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_tools(mut self, tools: Option<&'a ToolExecutor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// 结构化补全能力：持有 LLM 客户端、默认温度、工具轮数上限与单次请求超时
#[derive(Clone)]
pub struct LlmProvider {
    client: Arc<dyn LlmClient>,
    temperature: f32,
    max_tool_rounds: usize,
    request_timeout: Duration,
}

impl LlmProvider {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            temperature: 0.2,
            max_tool_rounds: 8,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.client.token_usage()
    }

    /// 补全并把最终文本转换为 T
    pub async fn complete<T: DeserializeOwned>(&self, request: CompletionRequest<'_>) -> Result<T, LlmError> {
        let text = self.complete_text(request).await?;
        parse_structured(&text)
    }

    /// 补全并返回最终文本（期间按需执行工具调用）
    pub async fn complete_text(&self, request: CompletionRequest<'_>) -> Result<String, LlmError> {
        let tools = request.tools.filter(|t| !t.registry().is_empty());
        let mut system = request.system_prompt;
        if let Some(t) = tools {
            system.push_str(&tools_section(t));
        }
        let options = CompletionOptions {
            temperature: request.temperature.unwrap_or(self.temperature),
        };

        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(request.history);
        messages.push(Message::user(request.user_message));

        let mut rounds = 0;
        loop {
            let reply = tokio::time::timeout(self.request_timeout, self.client.complete(&messages, &options))
                .await
                .map_err(|_| LlmError::Timeout(self.request_timeout.as_secs()))??;

            let Some(executor) = tools else {
                return Ok(reply);
            };
            let Some(call) = parse_tool_call(&reply, executor) else {
                return Ok(reply);
            };
            if rounds >= self.max_tool_rounds {
                return Err(LlmError::ToolLoopExceeded(self.max_tool_rounds));
            }
            rounds += 1;

            tracing::debug!(tool = %call.tool, round = rounds, "model requested tool");
            let observation = match executor.execute(&call.tool, call.args).await {
                Ok(out) => out,
                Err(e) => format!("Error: {}", e),
            };
            messages.push(Message::agent(reply));
            messages.push(Message::user(format!(
                "Observation from {}:\n{}",
                call.tool, observation
            )));
        }
    }
}

fn tools_section(executor: &ToolExecutor) -> String {
    format!(
        "\n\n## Available tools\n\
         Before giving your final answer you may call one tool at a time. To call a tool, reply with ONLY a JSON object \
         of the form {{\"tool\": \"<name>\", \"args\": {{...}}}} and nothing else; the result is sent back to you.\n\
         Tools:\n{}\n\nCall format schema:\n{}\n",
        executor.registry().to_schema_json(),
        tool_call_schema_json()
    )
}

/// 回复整体（可带 ```json 围栏）是一个调用已注册工具的 JSON 对象时返回 ToolCall
pub fn parse_tool_call(output: &str, executor: &ToolExecutor) -> Option<ToolCall> {
    let trimmed = output.trim();
    let body = strip_json_fence(trimmed).unwrap_or(trimmed);
    if !(body.starts_with('{') && body.ends_with('}')) {
        return None;
    }
    let call: ToolCall = serde_json::from_str(body).ok()?;
    if executor.has_tool(&call.tool) {
        Some(call)
    } else {
        None
    }
}

fn strip_json_fence(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("```json").or_else(|| s.strip_prefix("```"))?;
    let rest = rest.strip_suffix("```")?;
    Some(rest.trim())
}

/// 从文本中提取 JSON（```json 围栏优先，其次最外层花括号）
pub fn extract_json(output: &str) -> &str {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// 将模型文本转为 T；失败时 message 为 serde 错误原文
pub fn parse_structured<T: DeserializeOwned>(output: &str) -> Result<T, LlmError> {
    serde_json::from_str(extract_json(output)).map_err(|e| LlmError::Conversion {
        message: e.to_string(),
        raw: output.to_string(),
    })
}
