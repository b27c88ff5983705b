//! 流水线阶段
//!
//! 批处理策略：Analyzing → Planning → {Generating ⇄ Evaluating} →
//! (Confirming → Applying → Applied | Rejected) | MaxIterationsExceeded

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Analyzing,
    Planning,
    Generating,
    Evaluating,
    Confirming,
    Applying,
    Applied,
    Rejected,
    MaxIterationsExceeded,
    /// 增量策略结束，或无需修改
    Completed,
    Failed,
}

impl PipelinePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelinePhase::Applied
                | PipelinePhase::Rejected
                | PipelinePhase::MaxIterationsExceeded
                | PipelinePhase::Completed
                | PipelinePhase::Failed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelinePhase::Analyzing => "analyzing request",
            PipelinePhase::Planning => "planning",
            PipelinePhase::Generating => "generating changes",
            PipelinePhase::Evaluating => "evaluating",
            PipelinePhase::Confirming => "waiting for confirmation",
            PipelinePhase::Applying => "applying changes",
            PipelinePhase::Applied => "applied",
            PipelinePhase::Rejected => "rejected",
            PipelinePhase::MaxIterationsExceeded => "max iterations exceeded",
            PipelinePhase::Completed => "completed",
            PipelinePhase::Failed => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(!PipelinePhase::Generating.is_terminal());
        assert!(PipelinePhase::Rejected.is_terminal());
        assert_eq!(
            serde_json::to_string(&PipelinePhase::MaxIterationsExceeded).unwrap(),
            "\"max_iterations_exceeded\""
        );
    }
}
