//! 核心编排层：错误、流水线阶段、运行监管、人机交互、变更应用、编排器

pub mod applier;
pub mod error;
pub mod interaction;
pub mod orchestrator;
pub mod session_supervisor;
pub mod state;

pub use applier::CodeApplier;
pub use error::AgentError;
pub use interaction::{ConsoleInteraction, InteractionHandler, InteractionMessage, ScriptedInteraction};
pub use orchestrator::{
    CodingOutcome, CodingRequest, Orchestrator, OrchestratorConfig, OutcomeStatus, Strategy,
    MAX_ITERATIONS_CONFIDENCE, REJECTED_CONFIDENCE,
};
pub use session_supervisor::{cancellable, RunSupervisor};
pub use state::PipelinePhase;
