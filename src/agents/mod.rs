//! Agent 能力接口
//!
//! 每个 Agent 按名字注册到 [`AgentRegistry`]，每次调用都由工厂创建新实例，再从会话里的检查点恢复。
//! Agent 只读会话状态；所有状态修改都由 Orchestrator 完成。
//!
//! - **plan**: 诊断简历，产出修订计划
//! - **guide**: 单任务的对话状态机（发现 → 起草 → 确认 → 完成）
//! - **editor**: 把确认后的变更交给 [`editor::ChangeApplier`] 执行

pub mod editor;
pub mod guide;
pub mod plan;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::{AgentError, SessionState};
use crate::document::Resume;
use crate::workflow::{PendingChange, Plan};

pub use editor::{AppliedChange, ChangeApplier, EditorAgent};
pub use guide::{ConversationCheckpoint, GuideAgent, GuideState};
pub use plan::PlanAgent;
pub use registry::{AgentFactory, AgentRegistry};

pub const PLAN_AGENT: &str = "plan";
pub const GUIDE_AGENT: &str = "guide";
pub const EDITOR_AGENT: &str = "editor";

/// Agent 声明的下一步
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentAction {
    Continue,
    Handoff,
    WaitInput,
    RequestConfirm,
    Finish,
    SwitchTask,
}

/// 流式消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Think,
    Answer,
    Draft,
    Info,
    Tool,
    Data,
    Error,
}

/// 流式消息事件（按产生顺序推给调用方）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl AgentMessage {
    pub fn new(kind: MessageKind, agent: &str, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            agent: Some(agent.to_string()),
        }
    }

    pub fn info(agent: &str, content: impl Into<String>) -> Self {
        Self::new(MessageKind::Info, agent, content)
    }
}

/// Agent 输出内容
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AgentContent {
    #[default]
    None,
    Text(String),
    Plan(Plan),
    Change(PendingChange),
    Document(Resume),
}

#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    pub content: String,
}

impl AgentInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// 一次调用的终态输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub thought: String,
    pub action: AgentAction,
    #[serde(default)]
    pub content: AgentContent,
    #[serde(default)]
    pub next_agent: Option<String>,
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    #[serde(default)]
    pub target_task_index: Option<usize>,
    #[serde(default)]
    pub target_section: Option<String>,
}

impl AgentOutput {
    pub fn new(action: AgentAction, thought: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            action,
            content: AgentContent::None,
            next_agent: None,
            messages: Vec::new(),
            target_task_index: None,
            target_section: None,
        }
    }

    pub fn with_content(mut self, content: AgentContent) -> Self {
        self.content = content;
        self
    }

    pub fn handoff_to(mut self, agent: &str) -> Self {
        self.action = AgentAction::Handoff;
        self.next_agent = Some(agent.to_string());
        self
    }

    pub fn with_message(mut self, message: AgentMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            AgentContent::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// 各 Agent 的检查点；按形状区分，无状态 Agent 为 Empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentCheckpoint {
    #[default]
    Empty,
    Conversation(ConversationCheckpoint),
}

impl AgentCheckpoint {
    pub fn is_empty(&self) -> bool {
        matches!(self, AgentCheckpoint::Empty)
    }

    pub fn shape(&self) -> &'static str {
        match self {
            AgentCheckpoint::Empty => "empty",
            AgentCheckpoint::Conversation(_) => "conversation",
        }
    }
}

/// Agent trait：所有工作单元实现 invoke；流式、开场白、检查点均有默认实现
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn invoke(
        &mut self,
        input: &AgentInput,
        session: &SessionState,
    ) -> Result<AgentOutput, AgentError>;

    /// 流式变体：事件按产生顺序推入 events，返回值为终态输出。默认不推送事件
    async fn stream(
        &mut self,
        input: &AgentInput,
        session: &SessionState,
        _events: &mpsc::UnboundedSender<AgentMessage>,
    ) -> Result<AgentOutput, AgentError> {
        self.invoke(input, session).await
    }

    /// 主动开场白（仅对话型 Agent 支持）
    async fn opening(&mut self, _session: &SessionState) -> Result<AgentOutput, AgentError> {
        Err(AgentError::Unsupported {
            agent: self.name().to_string(),
            operation: "opening".to_string(),
        })
    }

    fn export_checkpoint(&self) -> AgentCheckpoint {
        AgentCheckpoint::Empty
    }

    /// 整体覆盖内部状态；形状不符时拒绝
    fn load_checkpoint(&mut self, checkpoint: AgentCheckpoint) -> Result<(), AgentError> {
        match checkpoint {
            AgentCheckpoint::Empty => Ok(()),
            other => Err(AgentError::CheckpointMismatch {
                agent: self.name().to_string(),
                expected: format!("empty, got {}", other.shape()),
            }),
        }
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_tagging() {
        let json = serde_json::to_string(&AgentCheckpoint::Empty).unwrap();
        assert_eq!(json, r#"{"kind":"empty"}"#);
        let cp = AgentCheckpoint::Conversation(ConversationCheckpoint::default());
        let json = serde_json::to_string(&cp).unwrap();
        assert!(json.contains(r#""kind":"conversation""#));
        assert_eq!(serde_json::from_str::<AgentCheckpoint>(&json).unwrap(), cp);
    }

    #[test]
    fn test_output_builders() {
        let out = AgentOutput::new(AgentAction::Continue, "t")
            .with_content(AgentContent::Text("hi".into()))
            .handoff_to(EDITOR_AGENT)
            .with_message(AgentMessage::info(GUIDE_AGENT, "note"));
        assert_eq!(out.action, AgentAction::Handoff);
        assert_eq!(out.next_agent.as_deref(), Some(EDITOR_AGENT));
        assert_eq!(out.text(), Some("hi"));
        assert_eq!(out.messages.len(), 1);
    }
}
