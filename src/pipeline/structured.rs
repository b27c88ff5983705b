//! 结构化补全 + 一次重试
//!
//! 输出无法反序列化时，把原请求与模型原始回复放入历史，附上 serde 错误原文再请求一次；
//! 第二次仍失败则返回 AgentError::Analysis（此时尚未产生任何文件修改）。

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::core::{cancellable, AgentError};
use crate::llm::{parse_structured, CompletionRequest, LlmError, LlmProvider};
use crate::memory::Message;
use crate::pipeline::prompts::parse_error_message;

/// 执行一次结构化补全；build 每次构造同一个请求
pub async fn complete_structured<'t, T, F>(
    provider: &LlmProvider,
    stage: &str,
    cancel: &CancellationToken,
    build: F,
) -> Result<T, AgentError>
where
    T: DeserializeOwned,
    F: Fn() -> CompletionRequest<'t>,
{
    let request = build();
    let user_message = request.user_message.clone();
    let text = cancellable(cancel, provider.complete_text(request)).await?;

    let (message, raw) = match parse_structured::<T>(&text) {
        Ok(value) => return Ok(value),
        Err(LlmError::Conversion { message, raw }) => (message, raw),
        Err(e) => return Err(e.into()),
    };
    tracing::warn!(stage, error = %message, "structured output did not parse, retrying once");

    let mut retry = build();
    retry.history.push(Message::user(user_message));
    retry.history.push(Message::agent(raw));
    retry.user_message = parse_error_message(&message);
    let text = cancellable(cancel, provider.complete_text(retry)).await?;

    parse_structured::<T>(&text).map_err(|e| match e {
        LlmError::Conversion { message, .. } => AgentError::analysis(stage, message),
        other => other.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde::Deserialize;

    use crate::llm::MockLlmClient;

    #[derive(Debug, Deserialize)]
    struct Answer {
        value: u32,
    }

    #[tokio::test]
    async fn test_retry_includes_parse_error() {
        let mock = Arc::new(MockLlmClient::new().with_replies("Stage", ["not json", r#"{"value": 7}"#]));
        let provider = LlmProvider::new(mock.clone());
        let cancel = CancellationToken::new();

        let answer: Answer = complete_structured(&provider, "test", &cancel, || {
            CompletionRequest::new("Stage prompt", "question")
        })
        .await
        .unwrap();
        assert_eq!(answer.value, 7);

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        let retry = &requests[1];
        // system, 原问题, 原回复, 错误说明
        assert_eq!(retry.len(), 4);
        assert_eq!(retry[1].content, "question");
        assert_eq!(retry[2].content, "not json");
        assert!(retry[3].content.contains("expected value"));
    }

    #[tokio::test]
    async fn test_second_failure_is_analysis_error() {
        let mock = Arc::new(MockLlmClient::new().with_replies("Stage", ["nope"]));
        let provider = LlmProvider::new(mock.clone());
        let cancel = CancellationToken::new();

        let err = complete_structured::<Answer, _>(&provider, "plan", &cancel, || {
            CompletionRequest::new("Stage prompt", "question")
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Analysis { ref stage, .. } if stage == "plan"));
        assert_eq!(mock.calls_matching("Stage"), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let mock = Arc::new(MockLlmClient::new());
        let provider = LlmProvider::new(mock.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = complete_structured::<Answer, _>(&provider, "analyze", &cancel, || {
            CompletionRequest::new("Stage prompt", "question")
        })
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
        assert!(mock.requests().is_empty());
    }
}
