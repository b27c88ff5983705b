//! 人机交互边界：提问、陈述与 yes/no 确认
//!
//! confirm 基于 interact 循环实现：回答不是可识别的 yes/no 时重新提问。

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};

use crate::core::AgentError;

/// 发给用户的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum InteractionMessage {
    /// 需要回答
    Question(String),
    /// 只需展示
    Statement(String),
}

impl InteractionMessage {
    pub fn text(&self) -> &str {
        match self {
            InteractionMessage::Question(t) | InteractionMessage::Statement(t) => t,
        }
    }
}

/// 识别 yes/no 回答；无法识别返回 None
pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" => Some(true),
        "n" | "no" | "false" => Some(false),
        _ => None,
    }
}

#[async_trait]
pub trait InteractionHandler: Send + Sync {
    /// 展示消息；Question 返回用户回答，Statement 返回空串
    async fn interact(&self, message: InteractionMessage) -> Result<String, AgentError>;

    /// 要求明确的 yes/no
    async fn confirm(&self, question: &str) -> Result<bool, AgentError> {
        let prompt = format!("{} [yes/no]", question);
        loop {
            let answer = self.interact(InteractionMessage::Question(prompt.clone())).await?;
            if let Some(yes) = parse_yes_no(&answer) {
                return Ok(yes);
            }
            tracing::debug!(answer = %answer, "unrecognised confirmation answer");
        }
    }
}

/// 终端交互：stdout 输出，stdin 读取一行
pub struct ConsoleInteraction {
    stdin: tokio::sync::Mutex<BufReader<Stdin>>,
}

impl ConsoleInteraction {
    pub fn new() -> Self {
        Self {
            stdin: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for ConsoleInteraction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InteractionHandler for ConsoleInteraction {
    async fn interact(&self, message: InteractionMessage) -> Result<String, AgentError> {
        match message {
            InteractionMessage::Statement(text) => {
                println!("{}", text);
                Ok(String::new())
            }
            InteractionMessage::Question(text) => {
                print!("{} ", text);
                std::io::stdout()
                    .flush()
                    .map_err(|e| AgentError::Interaction(e.to_string()))?;
                let mut line = String::new();
                let n = self
                    .stdin
                    .lock()
                    .await
                    .read_line(&mut line)
                    .await
                    .map_err(|e| AgentError::Interaction(e.to_string()))?;
                if n == 0 {
                    return Err(AgentError::Interaction("stdin closed".into()));
                }
                Ok(line.trim().to_string())
            }
        }
    }
}

/// 脚本化交互（测试用）：按顺序给出回答，记录所有展示过的消息
#[derive(Default)]
pub struct ScriptedInteraction {
    answers: Mutex<VecDeque<String>>,
    transcript: Mutex<Vec<InteractionMessage>>,
}

impl ScriptedInteraction {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            transcript: Mutex::new(Vec::new()),
        }
    }

    pub fn transcript(&self) -> Vec<InteractionMessage> {
        self.transcript.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn questions_asked(&self) -> usize {
        self.transcript()
            .iter()
            .filter(|m| matches!(m, InteractionMessage::Question(_)))
            .count()
    }
}

#[async_trait]
impl InteractionHandler for ScriptedInteraction {
    async fn interact(&self, message: InteractionMessage) -> Result<String, AgentError> {
        let is_question = matches!(message, InteractionMessage::Question(_));
        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
        if !is_question {
            return Ok(String::new());
        }
        self.answers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| AgentError::Interaction("no scripted answer left".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no(" Yes "), Some(true));
        assert_eq!(parse_yes_no("n"), Some(false));
        assert_eq!(parse_yes_no("maybe"), None);
    }

    #[tokio::test]
    async fn test_confirm_reprompts_until_recognised() {
        let handler = ScriptedInteraction::new(["maybe", "", "y"]);
        assert!(handler.confirm("Apply?").await.unwrap());
        assert_eq!(handler.questions_asked(), 3);
    }

    #[tokio::test]
    async fn test_confirm_fails_when_answers_run_out() {
        let handler = ScriptedInteraction::new(["what"]);
        let err = handler.confirm("Apply?").await.unwrap_err();
        assert!(matches!(err, AgentError::Interaction(_)));
    }

    #[tokio::test]
    async fn test_statement_needs_no_answer() {
        let handler = ScriptedInteraction::new(Vec::<String>::new());
        let out = handler
            .interact(InteractionMessage::Statement("diff".into()))
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(handler.transcript()[0].text(), "diff");
    }
}
