//! guide：单任务对话状态机
//!
//! DISCOVERY → DRAFTING → CONFIRMING → FINISHED，FINISHED 可经回溯回到 DRAFTING。
//! 每轮：追加用户消息 → 按状态 / 策略拼 prompt 调 LLM → 宽松解析决策 → 更新历史与草稿 → 状态迁移。
//!
//! 输出映射：刚进入 FINISHED 时 HANDOFF 给 editor；处于 CONFIRMING 时 REQUEST_CONFIRM；
//! 回溯到其他任务时 SWITCH_TASK；其余情况 WAIT_INPUT。

pub mod decision;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::{AgentError, SessionState};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::workflow::{PendingChange, Task};

use super::{
    Agent, AgentAction, AgentCheckpoint, AgentContent, AgentInput, AgentMessage, AgentOutput,
    MessageKind, EDITOR_AGENT, GUIDE_AGENT,
};
pub use decision::{Decision, NextAction, UserIntent};
pub use prompt::{WorkflowContext, OPENING_TRIGGER};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuideState {
    #[default]
    Discovery,
    Drafting,
    Confirming,
    Finished,
}

/// guide 检查点：状态、完整对话历史、最新草稿、待确认变更
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationCheckpoint {
    pub state: GuideState,
    #[serde(default)]
    pub dialogue_history: Vec<Message>,
    #[serde(default)]
    pub draft: Option<String>,
    #[serde(default)]
    pub pending_change: Option<PendingChange>,
}

/// 一轮决策作用于对话后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// 正常迁移（含停留在原状态）
    Moved,
    /// 本轮刚进入 FINISHED，或停留在 FINISHED 且变更尚未执行
    Finished,
    /// 从 FINISHED 回溯到 DRAFTING
    Reopened,
    /// 用户想回到计划中另一个任务
    SwitchTask(String),
}

impl ConversationCheckpoint {
    /// 状态迁移（历史与草稿已在调用前更新）
    pub fn apply(&mut self, decision: &Decision, task: &Task, session: &SessionState) -> TurnOutcome {
        if decision.intent == UserIntent::Backtrack {
            if let Some(target) = &decision.target_section {
                let other = session
                    .find_task_index(target)
                    .filter(|idx| *idx != session.current_task_index);
                if other.is_some() {
                    return TurnOutcome::SwitchTask(target.clone());
                }
            }
            if self.state == GuideState::Finished {
                self.pending_change = None;
                self.state = GuideState::Drafting;
                return TurnOutcome::Reopened;
            }
        }

        if self.state == GuideState::Finished {
            // 已确认的变更还没被执行时重新交给 editor
            return if self.pending_change.is_some() {
                TurnOutcome::Finished
            } else {
                TurnOutcome::Moved
            };
        }

        match decision.next_action {
            NextAction::ContinueAsking => {
                self.state = GuideState::Discovery;
                self.pending_change = None;
            }
            NextAction::ProposeDraft => {
                self.state = GuideState::Drafting;
                self.pending_change = None;
            }
            NextAction::RequestConfirm => match &self.draft {
                Some(draft) => {
                    self.pending_change = Some(PendingChange::from_draft(task, draft));
                    self.state = GuideState::Confirming;
                }
                None => {
                    tracing::warn!("REQUEST_CONFIRM without a draft, staying in DRAFTING");
                    self.state = GuideState::Drafting;
                }
            },
            NextAction::ConfirmFinish => match (&self.draft, self.state) {
                (Some(draft), GuideState::Confirming | GuideState::Drafting) => {
                    if self.state == GuideState::Drafting || self.pending_change.is_none() {
                        self.pending_change = Some(PendingChange::from_draft(task, draft));
                    }
                    self.state = GuideState::Finished;
                    return TurnOutcome::Finished;
                }
                (Some(_), _) => self.state = GuideState::Drafting,
                (None, _) => self.state = GuideState::Discovery,
            },
        }
        TurnOutcome::Moved
    }
}

pub struct GuideAgent {
    llm: Arc<dyn LlmClient>,
    conversation: ConversationCheckpoint,
}

impl GuideAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            conversation: ConversationCheckpoint::default(),
        }
    }

    pub fn state(&self) -> GuideState {
        self.conversation.state
    }

    pub fn conversation(&self) -> &ConversationCheckpoint {
        &self.conversation
    }

    async fn ask_llm(&self, system: String, history: &[Message]) -> Result<String, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(system));
        messages.extend_from_slice(history);
        Ok(self.llm.complete(&messages).await?)
    }

    /// 一轮完整对话；events 非空时实时推送思考、回复与草稿
    async fn turn(
        &mut self,
        input: &AgentInput,
        session: &SessionState,
        events: Option<&mpsc::UnboundedSender<AgentMessage>>,
    ) -> Result<AgentOutput, AgentError> {
        let task = session.current_task().ok_or(AgentError::NoCurrentTask)?.clone();

        let mut history = self.conversation.dialogue_history.clone();
        let first_turn = history.is_empty();
        history.push(Message::user(input.content.clone()));

        let context = WorkflowContext::from_session(session, first_turn);
        let system = prompt::system_prompt(&task, self.conversation.state, first_turn, &context);
        let raw = self.ask_llm(system, &history).await?;
        let decision = Decision::parse(&raw);
        tracing::debug!(
            task_id = task.id,
            state = ?self.conversation.state,
            next_action = ?decision.next_action,
            intent = ?decision.intent,
            "Guide decision"
        );

        let mut messages = Vec::new();
        let mut emit = |kind: MessageKind, content: &str| {
            let msg = AgentMessage::new(kind, GUIDE_AGENT, content);
            if let Some(tx) = events {
                let _ = tx.send(msg.clone());
            }
            messages.push(msg);
        };
        if !decision.thought.is_empty() {
            emit(MessageKind::Think, &decision.thought);
        }
        emit(MessageKind::Answer, &decision.reply_to_user);
        if let Some(draft) = &decision.draft_content {
            emit(MessageKind::Draft, draft);
        }

        history.push(Message::assistant(decision.reply_to_user.clone()));
        self.conversation.dialogue_history = history;
        let locked = self.conversation.state == GuideState::Finished
            && decision.intent != UserIntent::Backtrack;
        if let (Some(draft), false) = (&decision.draft_content, locked) {
            self.conversation.draft = Some(draft.clone());
        }

        let before = self.conversation.state;
        let outcome = self.conversation.apply(&decision, &task, session);
        tracing::info!(
            task_id = task.id,
            from = ?before,
            to = ?self.conversation.state,
            "Guide turn"
        );

        let mut output = match outcome {
            TurnOutcome::SwitchTask(target) => {
                let mut out = AgentOutput::new(AgentAction::SwitchTask, decision.thought.clone())
                    .with_content(AgentContent::Text(decision.reply_to_user.clone()));
                out.target_task_index = session.find_task_index(&target);
                out.target_section = Some(target);
                out
            }
            TurnOutcome::Finished => {
                let change = self.conversation.pending_change.clone().ok_or_else(|| {
                    AgentError::UnexpectedOutput {
                        agent: GUIDE_AGENT.to_string(),
                        detail: "finished without a pending change".to_string(),
                    }
                })?;
                AgentOutput::new(AgentAction::Handoff, decision.thought.clone())
                    .with_content(AgentContent::Change(change))
                    .handoff_to(EDITOR_AGENT)
            }
            TurnOutcome::Moved | TurnOutcome::Reopened => {
                match (&self.conversation.pending_change, self.conversation.state) {
                    (Some(change), GuideState::Confirming) => {
                        AgentOutput::new(AgentAction::RequestConfirm, decision.thought.clone())
                            .with_content(AgentContent::Change(change.clone()))
                    }
                    _ => AgentOutput::new(AgentAction::WaitInput, decision.thought.clone())
                        .with_content(AgentContent::Text(decision.reply_to_user.clone())),
                }
            }
        };
        output.messages = messages;
        Ok(output)
    }
}

#[async_trait]
impl Agent for GuideAgent {
    fn name(&self) -> &str {
        GUIDE_AGENT
    }

    fn description(&self) -> &str {
        "Conversational guide that drafts one revision task with the user"
    }

    async fn invoke(
        &mut self,
        input: &AgentInput,
        session: &SessionState,
    ) -> Result<AgentOutput, AgentError> {
        self.turn(input, session, None).await
    }

    async fn stream(
        &mut self,
        input: &AgentInput,
        session: &SessionState,
        events: &mpsc::UnboundedSender<AgentMessage>,
    ) -> Result<AgentOutput, AgentError> {
        self.turn(input, session, Some(events)).await
    }

    /// 开场白：历史非空时只提示进行中；LLM 失败时退回模板，历史保持为空
    async fn opening(&mut self, session: &SessionState) -> Result<AgentOutput, AgentError> {
        let task = session.current_task().ok_or(AgentError::NoCurrentTask)?.clone();

        if self.conversation.state == GuideState::Finished {
            return Ok(AgentOutput::new(AgentAction::WaitInput, "Task is already finished.")
                .with_content(AgentContent::Text("这个任务已经完成了。".to_string())));
        }
        if !self.conversation.dialogue_history.is_empty() {
            return Ok(AgentOutput::new(
                AgentAction::WaitInput,
                "Opening already generated, conversation in progress.",
            )
            .with_content(AgentContent::Text(
                "我们已经在进行中了，请继续回答问题或补充信息。".to_string(),
            )));
        }

        let context = WorkflowContext::from_session(session, true);
        let system = prompt::system_prompt(&task, GuideState::Discovery, true, &context);
        let trigger = Message::user(OPENING_TRIGGER);

        let reply = match self.ask_llm(system, std::slice::from_ref(&trigger)).await {
            Ok(raw) => {
                let decision = Decision::parse(&raw);
                if decision.next_action != NextAction::ContinueAsking {
                    tracing::warn!(
                        next_action = ?decision.next_action,
                        "Opening tried to skip ahead, forcing CONTINUE_ASKING"
                    );
                }
                self.conversation.state = GuideState::Discovery;
                self.conversation.dialogue_history.push(trigger);
                self.conversation
                    .dialogue_history
                    .push(Message::assistant(decision.reply_to_user.clone()));
                decision.reply_to_user
            }
            Err(e) => {
                tracing::warn!(error = %e, task_id = task.id, "Opening LLM call failed, using template");
                prompt::fallback_opening(&task)
            }
        };

        Ok(AgentOutput::new(AgentAction::WaitInput, "opening")
            .with_content(AgentContent::Text(reply.clone()))
            .with_message(AgentMessage::new(MessageKind::Answer, GUIDE_AGENT, reply)))
    }

    fn export_checkpoint(&self) -> AgentCheckpoint {
        AgentCheckpoint::Conversation(self.conversation.clone())
    }

    fn load_checkpoint(&mut self, checkpoint: AgentCheckpoint) -> Result<(), AgentError> {
        match checkpoint {
            AgentCheckpoint::Conversation(c) => {
                self.conversation = c;
                Ok(())
            }
            other => Err(AgentError::CheckpointMismatch {
                agent: GUIDE_AGENT.to_string(),
                expected: format!("conversation, got {}", other.shape()),
            }),
        }
    }

    fn reset(&mut self) {
        self.conversation = ConversationCheckpoint::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Resume;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::workflow::Plan;

    fn session() -> SessionState {
        let mut s = SessionState::with_id("s", Resume::default());
        s.plan = Some(Plan::new(vec![
            Task::new(1, "Work Experience").with_diagnosis("vague", "quantify"),
            Task::new(2, "Skills"),
        ]));
        s
    }

    fn decision(action: &str, draft: Option<&str>) -> String {
        let mut v = serde_json::json!({
            "thought": "t",
            "next_action": action,
            "reply_to_user": format!("reply {}", action),
        });
        if let Some(d) = draft {
            v["draft_content"] = d.into();
        }
        v.to_string()
    }

    fn guide(replies: Vec<String>) -> (GuideAgent, Arc<MockLlmClient>) {
        let mock = Arc::new(MockLlmClient::scripted(replies));
        (GuideAgent::new(mock.clone()), mock)
    }

    #[tokio::test]
    async fn test_draft_then_confirm_then_finish() {
        let s = session();
        let (mut g, _) = guide(vec![
            decision("PROPOSE_DRAFT", Some("X")),
            decision("REQUEST_CONFIRM", None),
            decision("CONFIRM_FINISH", None),
        ]);

        let out = g.invoke(&AgentInput::new("I led a team"), &s).await.unwrap();
        assert_eq!(out.action, AgentAction::WaitInput);
        assert_eq!(g.state(), GuideState::Drafting);

        let out = g.invoke(&AgentInput::new("looks good"), &s).await.unwrap();
        assert_eq!(out.action, AgentAction::RequestConfirm);
        assert_eq!(g.state(), GuideState::Confirming);
        match &out.content {
            AgentContent::Change(c) => assert_eq!(c.preview_text, "X"),
            other => panic!("unexpected content {:?}", other),
        }

        let out = g.invoke(&AgentInput::new("confirm"), &s).await.unwrap();
        assert_eq!(out.action, AgentAction::Handoff);
        assert_eq!(out.next_agent.as_deref(), Some(EDITOR_AGENT));
        assert_eq!(g.state(), GuideState::Finished);
        assert_eq!(g.conversation().dialogue_history.len(), 6);
    }

    #[tokio::test]
    async fn test_request_confirm_without_draft_stays_drafting() {
        let s = session();
        let (mut g, _) = guide(vec![decision("REQUEST_CONFIRM", None)]);
        let out = g.invoke(&AgentInput::new("ok"), &s).await.unwrap();
        assert_eq!(out.action, AgentAction::WaitInput);
        assert_eq!(g.state(), GuideState::Drafting);
        assert!(g.conversation().pending_change.is_none());
    }

    #[tokio::test]
    async fn test_confirm_finish_from_discovery_without_draft() {
        let s = session();
        let (mut g, _) = guide(vec![decision("CONFIRM_FINISH", None)]);
        g.invoke(&AgentInput::new("done"), &s).await.unwrap();
        assert_eq!(g.state(), GuideState::Discovery);
    }

    #[tokio::test]
    async fn test_finished_backtrack_reopens_and_keeps_draft() {
        let s = session();
        let (mut g, _) = guide(vec![
            decision("PROPOSE_DRAFT", Some("X")),
            decision("CONFIRM_FINISH", None),
            r#"{"thought": "t", "intent": "BACKTRACK", "next_action": "CONTINUE_ASKING", "reply_to_user": "sure"}"#.to_string(),
        ]);
        g.invoke(&AgentInput::new("a"), &s).await.unwrap();
        let out = g.invoke(&AgentInput::new("b"), &s).await.unwrap();
        assert_eq!(out.action, AgentAction::Handoff);

        let out = g.invoke(&AgentInput::new("wait, change it"), &s).await.unwrap();
        assert_eq!(out.action, AgentAction::WaitInput);
        assert_eq!(g.state(), GuideState::Drafting);
        assert_eq!(g.conversation().draft.as_deref(), Some("X"));
        assert!(g.conversation().pending_change.is_none());
    }

    #[tokio::test]
    async fn test_finished_without_backtrack_rehands_off_same_change() {
        let s = session();
        let (mut g, _) = guide(vec![
            decision("PROPOSE_DRAFT", Some("X")),
            decision("CONFIRM_FINISH", None),
            decision("PROPOSE_DRAFT", Some("Y")),
        ]);
        g.invoke(&AgentInput::new("a"), &s).await.unwrap();
        g.invoke(&AgentInput::new("b"), &s).await.unwrap();
        let out = g.invoke(&AgentInput::new("thanks"), &s).await.unwrap();
        assert_eq!(out.action, AgentAction::Handoff);
        assert_eq!(out.next_agent.as_deref(), Some(EDITOR_AGENT));
        match out.content {
            AgentContent::Change(c) => assert_eq!(c.preview_text, "X"),
            other => panic!("unexpected content {:?}", other),
        }
        assert_eq!(g.state(), GuideState::Finished);
        assert_eq!(g.conversation().draft.as_deref(), Some("X"));
    }

    #[tokio::test]
    async fn test_finished_without_pending_change_waits() {
        let s = session();
        let (mut g, _) = guide(vec![decision("CONFIRM_FINISH", None)]);
        g.load_checkpoint(AgentCheckpoint::Conversation(ConversationCheckpoint {
            state: GuideState::Finished,
            draft: Some("X".to_string()),
            ..Default::default()
        }))
        .unwrap();
        let out = g.invoke(&AgentInput::new("thanks"), &s).await.unwrap();
        assert_eq!(out.action, AgentAction::WaitInput);
        assert_eq!(g.state(), GuideState::Finished);
    }

    #[tokio::test]
    async fn test_backtrack_to_other_task_requests_switch() {
        let s = session();
        let (mut g, _) = guide(vec![
            r#"{"intent": "BACKTRACK", "target_section": "Skills", "next_action": "CONTINUE_ASKING", "reply_to_user": "ok"}"#.to_string(),
        ]);
        let out = g.invoke(&AgentInput::new("let's redo skills"), &s).await.unwrap();
        assert_eq!(out.action, AgentAction::SwitchTask);
        assert_eq!(out.target_section.as_deref(), Some("Skills"));
        assert_eq!(out.target_task_index, Some(1));
    }

    #[tokio::test]
    async fn test_unparseable_output_is_plain_reply() {
        let s = session();
        let (mut g, _) = guide(vec!["not json at all".to_string()]);
        let out = g.invoke(&AgentInput::new("hi"), &s).await.unwrap();
        assert_eq!(out.action, AgentAction::WaitInput);
        assert_eq!(out.text(), Some("not json at all"));
        assert_eq!(g.state(), GuideState::Discovery);
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let s = session();
        let mock = Arc::new(MockLlmClient::new());
        mock.push_failure(LlmError::Timeout(5));
        let mut g = GuideAgent::new(mock);
        let err = g.invoke(&AgentInput::new("hi"), &s).await.unwrap_err();
        assert!(matches!(err, AgentError::LlmError(_)));
        assert!(g.conversation().dialogue_history.is_empty());
    }

    #[tokio::test]
    async fn test_stream_emits_events_in_order() {
        let s = session();
        let (mut g, _) = guide(vec![decision("PROPOSE_DRAFT", Some("X"))]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let out = g.stream(&AgentInput::new("go"), &s, &tx).await.unwrap();
        drop(tx);
        let mut kinds = Vec::new();
        while let Some(m) = rx.recv().await {
            kinds.push(m.kind);
        }
        assert_eq!(kinds, vec![MessageKind::Think, MessageKind::Answer, MessageKind::Draft]);
        assert_eq!(out.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_opening_forces_discovery() {
        let s = session();
        let (mut g, mock) = guide(vec![decision("PROPOSE_DRAFT", Some("too early"))]);
        let out = g.opening(&s).await.unwrap();
        assert_eq!(out.action, AgentAction::WaitInput);
        assert_eq!(g.state(), GuideState::Discovery);
        assert_eq!(g.conversation().dialogue_history.len(), 2);
        assert_eq!(g.conversation().dialogue_history[0].content, OPENING_TRIGGER);
        assert_eq!(mock.request_count(), 1);

        // 历史非空时不再调用 LLM
        g.opening(&s).await.unwrap();
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_opening_falls_back_on_llm_failure() {
        let s = session();
        let mock = Arc::new(MockLlmClient::new());
        mock.push_failure(LlmError::EmptyResponse);
        let mut g = GuideAgent::new(mock);
        let out = g.opening(&s).await.unwrap();
        assert!(out.text().unwrap().contains("vague"));
        assert!(g.conversation().dialogue_history.is_empty());
    }

    #[test]
    fn test_checkpoint_round_trip_and_mismatch() {
        let mut cp = ConversationCheckpoint::default();
        cp.state = GuideState::Confirming;
        cp.dialogue_history = vec![Message::user("a"), Message::assistant("b")];
        cp.draft = Some("d".into());
        cp.pending_change = Some(PendingChange::from_draft(&Task::new(1, "Work"), "d"));

        let mut g = GuideAgent::new(Arc::new(MockLlmClient::new()));
        g.load_checkpoint(AgentCheckpoint::Conversation(cp.clone())).unwrap();
        assert_eq!(g.export_checkpoint(), AgentCheckpoint::Conversation(cp));

        assert!(matches!(
            g.load_checkpoint(AgentCheckpoint::Empty),
            Err(AgentError::CheckpointMismatch { .. })
        ));
        g.reset();
        assert_eq!(g.state(), GuideState::Discovery);
    }
}
