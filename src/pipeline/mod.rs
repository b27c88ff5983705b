//! 请求到变更的流水线
//!
//! - **context**: 工作集文件与消息历史
//! - **reasoner / planner / strategy**: Understanding、GenerationPlan 与可选的计划细化
//! - **action_parser / actions**: ACTION 文本协议的解析与动作注册表
//! - **workspace**: Direct / Staged 两种写入方式
//! - **generator**: 每轮一个动作的生成循环

pub mod action_parser;
pub mod actions;
pub mod changes;
pub mod context;
pub mod events;
pub mod generator;
pub mod planner;
pub mod prompts;
pub mod reasoner;
pub mod strategy;
pub mod structured;
pub mod types;
pub mod workspace;

pub use action_parser::{count_actions_in_response, parse_response, ActionParams, ParsedAction};
pub use actions::{ActionEnv, ActionError, ActionHandler, ActionRegistry, LlmAction};
pub use changes::{render_diff, FileChange, SearchReplace};
pub use context::ContextManager;
pub use events::{EventSender, PipelineEvent};
pub use generator::{ActionDrivenGenerator, GenerationSession, GeneratorConfig};
pub use planner::Planner;
pub use reasoner::Reasoner;
pub use strategy::ReasoningStrategy;
pub use types::{CodingResult, Evaluation, GenerationPlan, GenerationResult, GenerationStep, Understanding};
pub use workspace::{WriteMode, Workspace};
