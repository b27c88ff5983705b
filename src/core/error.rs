//! Agent 错误类型
//!
//! 只有分析失败、LLM 传输失败、取消、配置、交互与应用变更的错误会向调用方传播；
//! 动作循环内的问题（解析失败、文件写入失败、多动作）一律转为反馈文本，不走这里。

use thiserror::Error;

use crate::llm::LlmError;

/// 流水线运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Understanding / Plan / Evaluation 重试一次后仍无法反序列化
    #[error("Analysis failed during {stage}: {message}")]
    Analysis { stage: String, message: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    /// 确认后写入文件失败（不回滚已写入的文件）
    #[error("Failed to apply changes: {0}")]
    Apply(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),
}

impl AgentError {
    pub fn analysis(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Analysis {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// 是否为用户主动取消
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_converts() {
        let err: AgentError = LlmError::Timeout(60).into();
        assert!(matches!(err, AgentError::Llm(LlmError::Timeout(60))));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_analysis_display() {
        let err = AgentError::analysis("plan", "missing field `steps`");
        assert_eq!(
            err.to_string(),
            "Analysis failed during plan: missing field `steps`"
        );
        assert!(!err.is_cancelled());
        assert!(AgentError::Cancelled.is_cancelled());
    }
}
