//! 流水线过程事件：阶段切换、动作、反馈、评估，供 CLI 等前端展示

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::PipelinePhase;

/// 单个过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    PhaseChanged { phase: PipelinePhase },
    /// 生成循环第几轮
    Thinking { turn: usize },
    ActionReceived { action: String, summary: String },
    ActionFeedback { feedback: String, success: bool },
    /// 一次回复包含多个动作，已要求模型重发
    MultiActionRejected { count: usize },
    Evaluation {
        iteration: usize,
        meets_requirements: bool,
        confidence: f64,
    },
    Error { text: String },
}

pub type EventSender = UnboundedSender<PipelineEvent>;

pub fn send_event(tx: Option<&EventSender>, ev: PipelineEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
