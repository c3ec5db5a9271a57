//! 核心编排层：错误、会话状态、编排器与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod state;

pub use builder::OrchestratorBuilder;
pub use error::AgentError;
pub use orchestrator::{Orchestrator, Router, StepResult};
pub use state::{Progress, SessionState, TaskSummary, WorkflowStage};
