//! 工作流错误类型
//!
//! 三类失败：前置条件不满足（未做任何修改即返回）、协作方失败（LLM / 改写器，会把会话置为 ERROR）、
//! 检查点形状不匹配。LLM 输出格式不合法不属于错误，由各 Agent 就地兜底。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排与 Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Agent not registered: {0}")]
    AgentNotRegistered(String),

    #[error("No plan in session")]
    NoPlan,

    #[error("No current task")]
    NoCurrentTask,

    #[error("No pending change to apply")]
    NoPendingChange,

    #[error("No task matches '{0}'")]
    TaskNotFound(String),

    #[error("Checkpoint mismatch for agent {agent}: expected {expected}")]
    CheckpointMismatch { agent: String, expected: String },

    #[error("Agent {agent} does not support {operation}")]
    Unsupported { agent: String, operation: String },

    /// Agent 没有给出约定的产出（如 plan 没有返回 Plan）
    #[error("Unexpected output from {agent}: {detail}")]
    UnexpectedOutput { agent: String, detail: String },

    #[error("Change application failed: {0}")]
    ChangeFailed(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 前置条件错误：调用方请求不合法，会话未被修改
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            AgentError::AgentNotRegistered(_)
                | AgentError::NoPlan
                | AgentError::NoCurrentTask
                | AgentError::NoPendingChange
                | AgentError::TaskNotFound(_)
        )
    }
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        AgentError::LlmError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_classification() {
        assert!(AgentError::NoPendingChange.is_precondition());
        assert!(AgentError::TaskNotFound("Skills".into()).is_precondition());
        assert!(!AgentError::LlmError("boom".into()).is_precondition());
        assert!(!AgentError::ChangeFailed("no section".into()).is_precondition());
    }

    #[test]
    fn test_from_llm_error() {
        let err: AgentError = LlmError::Timeout(30).into();
        assert!(matches!(err, AgentError::LlmError(ref m) if m.contains("30")));
    }
}
