//! editor：执行已确认的变更
//!
//! 改写逻辑由 [`ChangeApplier`] 提供（默认 [`crate::document::DirectEditor`]），editor 本身无状态。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::{AgentError, SessionState};
use crate::document::Resume;
use crate::workflow::PendingChange;

use super::{
    Agent, AgentAction, AgentContent, AgentInput, AgentMessage, AgentOutput, MessageKind,
    EDITOR_AGENT,
};

/// 改写结果：新文档 + 给用户看的执行说明
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub document: Resume,
    pub messages: Vec<String>,
}

/// 变更执行协作方；失败时不得修改传入的文档
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    async fn apply(&self, change: &PendingChange, document: &Resume) -> Result<AppliedChange, AgentError>;
}

pub struct EditorAgent {
    applier: Arc<dyn ChangeApplier>,
}

impl EditorAgent {
    pub fn new(applier: Arc<dyn ChangeApplier>) -> Self {
        Self { applier }
    }

    async fn run(
        &self,
        session: &SessionState,
        events: Option<&mpsc::UnboundedSender<AgentMessage>>,
    ) -> Result<AgentOutput, AgentError> {
        let change = session
            .pending_change
            .as_ref()
            .ok_or(AgentError::NoPendingChange)?;

        let mut messages = vec![AgentMessage::info(
            EDITOR_AGENT,
            format!("Applying {:?} to {}", change.operation, change.section_title),
        )];
        if let Some(tx) = events {
            let _ = tx.send(messages[0].clone());
        }

        let applied = self.applier.apply(change, &session.document).await?;
        for text in applied.messages {
            let msg = AgentMessage::new(MessageKind::Tool, EDITOR_AGENT, text);
            if let Some(tx) = events {
                let _ = tx.send(msg.clone());
            }
            messages.push(msg);
        }

        let mut output = AgentOutput::new(
            AgentAction::Finish,
            format!("Applied change for task {}", change.task_id),
        )
        .with_content(AgentContent::Document(applied.document));
        output.messages = messages;
        Ok(output)
    }
}

#[async_trait]
impl Agent for EditorAgent {
    fn name(&self) -> &str {
        EDITOR_AGENT
    }

    fn description(&self) -> &str {
        "Applies a confirmed change to the document"
    }

    async fn invoke(
        &mut self,
        _input: &AgentInput,
        session: &SessionState,
    ) -> Result<AgentOutput, AgentError> {
        self.run(session, None).await
    }

    async fn stream(
        &mut self,
        _input: &AgentInput,
        session: &SessionState,
        events: &mpsc::UnboundedSender<AgentMessage>,
    ) -> Result<AgentOutput, AgentError> {
        self.run(session, Some(events)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WorkflowStage;
    use crate::document::{DirectEditor, Section};
    use crate::workflow::Task;

    #[tokio::test]
    async fn test_editor_requires_pending_change() {
        let mut agent = EditorAgent::new(Arc::new(DirectEditor::new()));
        let session = SessionState::new(Resume::default());
        let err = agent.invoke(&AgentInput::default(), &session).await.unwrap_err();
        assert!(matches!(err, AgentError::NoPendingChange));
    }

    #[tokio::test]
    async fn test_editor_returns_new_document() {
        let mut agent = EditorAgent::new(Arc::new(DirectEditor::new()));
        let mut session = SessionState::new(Resume {
            sections: vec![Section::text("Summary", "old")],
            ..Default::default()
        });
        session.stage = WorkflowStage::Applying;
        session.pending_change = Some(PendingChange::from_draft(&Task::new(1, "Summary"), "new"));

        let out = agent.invoke(&AgentInput::default(), &session).await.unwrap();
        assert_eq!(out.action, AgentAction::Finish);
        match out.content {
            AgentContent::Document(doc) => match &doc.sections[0] {
                Section::Text { content, .. } => assert_eq!(content, "new"),
                other => panic!("unexpected section {:?}", other),
            },
            other => panic!("unexpected content {:?}", other),
        }
        assert_eq!(out.messages.len(), 2);
        assert_eq!(out.messages[1].kind, MessageKind::Tool);
    }
}
