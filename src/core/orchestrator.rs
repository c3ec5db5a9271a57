//! 工作流编排器
//!
//! 持有 Agent 注册表与路由表，对外提供面向调用方的工作流：
//! produce-plan / open-task / advance-conversation / apply-change / skip / advance / switch / progress。
//!
//! 每次调用：从工厂创建 Agent → 从会话恢复检查点 → 调用 → 写回检查点与状态变更。
//! 前置条件不满足时在修改会话之前返回错误；协作方失败时会话进入 ERROR 并返回错误，不做重试。
//!
//! 下一个 Agent 的解析顺序：HANDOFF 指定的 next_agent > 当前 Agent 的自定义路由 > 默认路由表。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agents::{
    Agent, AgentAction, AgentCheckpoint, AgentContent, AgentInput, AgentMessage, AgentOutput,
    AgentRegistry, EDITOR_AGENT, GUIDE_AGENT, PLAN_AGENT,
};
use crate::core::{AgentError, Progress, SessionState, WorkflowStage};
use crate::workflow::{Task, TaskStatus};

const ORCHESTRATOR: &str = "orchestrator";

/// 自定义路由：根据会话状态决定下一个 Agent，返回 None 时交给默认路由表
pub type Router = Arc<dyn Fn(&SessionState) -> Option<String> + Send + Sync>;

/// 一次工作流调用的结果
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// 非流式调用时收集到的全部事件；流式调用时事件已推给调用方，此处为空
    pub events: Vec<AgentMessage>,
    pub output: AgentOutput,
    pub next_agent: Option<String>,
}

impl StepResult {
    fn new(output: AgentOutput, next_agent: Option<String>) -> Self {
        Self {
            events: Vec::new(),
            output,
            next_agent,
        }
    }
}

pub struct Orchestrator {
    registry: AgentRegistry,
    routes: HashMap<String, String>,
    routers: HashMap<String, Router>,
}

impl Orchestrator {
    /// 默认路由：plan → guide → editor → guide
    pub fn new(registry: AgentRegistry) -> Self {
        let routes = [
            (PLAN_AGENT, GUIDE_AGENT),
            (GUIDE_AGENT, EDITOR_AGENT),
            (EDITOR_AGENT, GUIDE_AGENT),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();
        Self {
            registry,
            routes,
            routers: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn set_route(&mut self, from: &str, to: &str) -> &mut Self {
        self.routes.insert(from.to_string(), to.to_string());
        self
    }

    pub fn set_router<F>(&mut self, from: &str, router: F) -> &mut Self
    where
        F: Fn(&SessionState) -> Option<String> + Send + Sync + 'static,
    {
        self.routers.insert(from.to_string(), Arc::new(router));
        self
    }

    pub fn next_agent(
        &self,
        current: &str,
        session: &SessionState,
        output: &AgentOutput,
    ) -> Option<String> {
        if output.action == AgentAction::Handoff {
            if let Some(next) = &output.next_agent {
                return Some(next.clone());
            }
        }
        if let Some(next) = self.routers.get(current).and_then(|r| r(session)) {
            return Some(next);
        }
        self.routes.get(current).cloned()
    }

    /// 新建实例并从会话中的检查点恢复
    fn rehydrate(&self, name: &str, session: &SessionState) -> Result<Box<dyn Agent>, AgentError> {
        let mut agent = self
            .registry
            .instantiate(name)
            .ok_or_else(|| AgentError::AgentNotRegistered(name.to_string()))?;
        if let Some(cp) = session.checkpoint(name) {
            agent.load_checkpoint(cp.clone())?;
        }
        Ok(agent)
    }

    fn current_task(session: &SessionState) -> Result<Task, AgentError> {
        if session.plan.is_none() {
            return Err(AgentError::NoPlan);
        }
        session.current_task().cloned().ok_or(AgentError::NoCurrentTask)
    }

    fn fail(session: &mut SessionState, agent: &str, err: AgentError) -> AgentError {
        tracing::error!(session_id = %session.session_id, agent, error = %err, "Workflow step failed");
        session.fail(err.to_string());
        err
    }

    // ---------------------------------------------------------------- plan

    pub async fn produce_plan(
        &self,
        session: &mut SessionState,
        intent: &str,
    ) -> Result<StepResult, AgentError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let result = self.produce_plan_stream(session, intent, &tx).await;
        collect(result, tx, rx)
    }

    pub async fn produce_plan_stream(
        &self,
        session: &mut SessionState,
        intent: &str,
        events: &mpsc::UnboundedSender<AgentMessage>,
    ) -> Result<StepResult, AgentError> {
        let mut agent = self.rehydrate(PLAN_AGENT, session)?;
        session.stage = WorkflowStage::Planning;
        session.user_intent = Some(intent.to_string());
        tracing::info!(session_id = %session.session_id, "Producing plan");

        let output = match agent.stream(&AgentInput::new(intent), session, events).await {
            Ok(o) => o,
            Err(e) => return Err(Self::fail(session, PLAN_AGENT, e)),
        };
        session.save_checkpoint(PLAN_AGENT, agent.export_checkpoint());

        let plan = match (&output.action, &output.content) {
            (AgentAction::Finish, AgentContent::Plan(plan)) => plan.clone(),
            _ => {
                let err = AgentError::UnexpectedOutput {
                    agent: PLAN_AGENT.to_string(),
                    detail: format!("expected FINISH with a plan, got {:?}", output.action),
                };
                return Err(Self::fail(session, PLAN_AGENT, err));
            }
        };

        let empty = plan.is_empty();
        session.plan = Some(plan);
        session.current_task_index = 0;
        session.pending_change = None;
        session.error_message = None;
        session.clear_checkpoint(GUIDE_AGENT);
        session.stage = if empty {
            WorkflowStage::Completed
        } else {
            WorkflowStage::Guiding
        };
        tracing::info!(
            session_id = %session.session_id,
            tasks = session.task_count(),
            stage = ?session.stage,
            "Plan stored"
        );

        let next = self.next_agent(PLAN_AGENT, session, &output);
        Ok(StepResult::new(output, next))
    }

    // ---------------------------------------------------------------- guide

    /// 当前任务的主动开场白；LLM 失败时退回模板文案，不进入 ERROR
    pub async fn open_task(&self, session: &mut SessionState) -> Result<StepResult, AgentError> {
        let task = Self::current_task(session)?;
        let mut agent = self.rehydrate(GUIDE_AGENT, session)?;
        // 已确认待执行的变更保持原样，开场白不影响它
        if session.pending_change.is_none() {
            session.stage = WorkflowStage::Guiding;
        }
        if task.status == TaskStatus::Pending {
            session.set_task_status(task.id, TaskStatus::InProgress);
        }

        let output = match agent.opening(session).await {
            Ok(o) => o,
            Err(e) => return Err(Self::fail(session, GUIDE_AGENT, e)),
        };
        session.save_checkpoint(GUIDE_AGENT, agent.export_checkpoint());
        tracing::info!(session_id = %session.session_id, task_id = task.id, "Task opened");

        let mut result = StepResult::new(output, None);
        result.events = result.output.messages.clone();
        Ok(result)
    }

    pub async fn advance_conversation(
        &self,
        session: &mut SessionState,
        user_input: &str,
    ) -> Result<StepResult, AgentError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let result = self.advance_conversation_stream(session, user_input, &tx).await;
        collect(result, tx, rx)
    }

    pub async fn advance_conversation_stream(
        &self,
        session: &mut SessionState,
        user_input: &str,
        events: &mpsc::UnboundedSender<AgentMessage>,
    ) -> Result<StepResult, AgentError> {
        let task = Self::current_task(session)?;
        let mut agent = self.rehydrate(GUIDE_AGENT, session)?;
        session.stage = WorkflowStage::Guiding;
        if task.status == TaskStatus::Pending {
            session.set_task_status(task.id, TaskStatus::InProgress);
        }

        let input = AgentInput::new(user_input);
        let output = match agent.stream(&input, session, events).await {
            Ok(o) => o,
            Err(e) => return Err(Self::fail(session, GUIDE_AGENT, e)),
        };
        session.save_checkpoint(GUIDE_AGENT, agent.export_checkpoint());
        session.error_message = None;

        let next = self.next_agent(GUIDE_AGENT, session, &output);
        match (output.action, &output.content) {
            (AgentAction::RequestConfirm, AgentContent::Change(change)) => {
                session.pending_change = Some(change.clone());
                session.stage = WorkflowStage::Confirming;
            }
            (AgentAction::Handoff, AgentContent::Change(change))
                if next.as_deref() == Some(EDITOR_AGENT) =>
            {
                session.pending_change = Some(change.clone());
                session.stage = WorkflowStage::Confirming;
            }
            (AgentAction::SwitchTask, _) => {
                let target = output.target_section.clone().unwrap_or_default();
                match session.switch_to_task(&target) {
                    Some(idx) => {
                        tracing::info!(session_id = %session.session_id, target = %target, index = idx, "Switched task");
                        let _ = events.send(AgentMessage::info(
                            ORCHESTRATOR,
                            format!("Switched to task {}: {}", idx + 1, target),
                        ));
                    }
                    None => {
                        tracing::warn!(target = %target, "Switch requested but no task matches");
                        session.pending_change = None;
                    }
                }
            }
            _ => session.pending_change = None,
        }

        tracing::info!(
            session_id = %session.session_id,
            action = ?output.action,
            stage = ?session.stage,
            "Conversation advanced"
        );
        Ok(StepResult::new(output, next))
    }

    // ---------------------------------------------------------------- editor

    pub async fn apply_change(&self, session: &mut SessionState) -> Result<StepResult, AgentError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let result = self.apply_change_stream(session, &tx).await;
        collect(result, tx, rx)
    }

    pub async fn apply_change_stream(
        &self,
        session: &mut SessionState,
        events: &mpsc::UnboundedSender<AgentMessage>,
    ) -> Result<StepResult, AgentError> {
        let change = session
            .pending_change
            .clone()
            .ok_or(AgentError::NoPendingChange)?;
        let mut agent = self.rehydrate(EDITOR_AGENT, session)?;
        session.stage = WorkflowStage::Applying;

        let input = AgentInput::new(change.preview_text.clone());
        let output = match agent.stream(&input, session, events).await {
            Ok(o) => o,
            Err(e) => return Err(Self::fail(session, EDITOR_AGENT, e)),
        };
        session.save_checkpoint(EDITOR_AGENT, agent.export_checkpoint());

        let document = match (&output.action, &output.content) {
            (AgentAction::Finish, AgentContent::Document(doc)) => doc.clone(),
            _ => {
                let err = AgentError::UnexpectedOutput {
                    agent: EDITOR_AGENT.to_string(),
                    detail: format!("expected FINISH with a document, got {:?}", output.action),
                };
                return Err(Self::fail(session, EDITOR_AGENT, err));
            }
        };

        session.document = document;
        session.set_task_status(change.task_id, TaskStatus::Completed);
        session.pending_change = None;
        session.error_message = None;

        if session.all_tasks_done() {
            // guide 检查点保留，FINISHED 状态下仍可回溯；已执行的变更不再交给 editor
            if let Some(AgentCheckpoint::Conversation(c)) =
                session.agent_checkpoints.get_mut(GUIDE_AGENT)
            {
                c.pending_change = None;
            }
            session.stage = WorkflowStage::Completed;
            let _ = events.send(AgentMessage::info(ORCHESTRATOR, "All tasks completed"));
        } else {
            session.advance_task();
            if let Some(task) = session.current_task() {
                let _ = events.send(AgentMessage::info(
                    ORCHESTRATOR,
                    format!("Next task {}: {}", task.id, task.section),
                ));
            }
        }
        tracing::info!(
            session_id = %session.session_id,
            task_id = change.task_id,
            stage = ?session.stage,
            index = session.current_task_index,
            "Change applied"
        );

        let next = self.next_agent(EDITOR_AGENT, session, &output);
        Ok(StepResult::new(output, next))
    }

    // ---------------------------------------------------------------- navigation

    /// 跳过当前任务；返回被跳过的任务
    pub fn skip_current_task(&self, session: &mut SessionState) -> Result<Task, AgentError> {
        Self::current_task(session)?;
        let skipped = session
            .skip_current_task()
            .ok_or(AgentError::NoCurrentTask)?;
        tracing::info!(
            session_id = %session.session_id,
            task_id = skipped.id,
            index = session.current_task_index,
            "Task skipped"
        );
        Ok(skipped)
    }

    /// 不改状态地前进到下一个任务
    pub fn advance_task(&self, session: &mut SessionState) -> Result<(), AgentError> {
        Self::current_task(session)?;
        session.advance_task();
        tracing::info!(
            session_id = %session.session_id,
            index = session.current_task_index,
            stage = ?session.stage,
            "Advanced to next task"
        );
        Ok(())
    }

    pub fn switch_to_task(&self, session: &mut SessionState, label: &str) -> Result<usize, AgentError> {
        if session.plan.is_none() {
            return Err(AgentError::NoPlan);
        }
        let idx = session
            .switch_to_task(label)
            .ok_or_else(|| AgentError::TaskNotFound(label.to_string()))?;
        tracing::info!(session_id = %session.session_id, label, index = idx, "Switched task");
        Ok(idx)
    }

    pub fn progress(&self, session: &SessionState) -> Progress {
        session.progress()
    }
}

/// 非流式调用：收集通道中已产生的事件并附到结果上
fn collect(
    result: Result<StepResult, AgentError>,
    tx: mpsc::UnboundedSender<AgentMessage>,
    mut rx: mpsc::UnboundedReceiver<AgentMessage>,
) -> Result<StepResult, AgentError> {
    drop(tx);
    let mut result = result?;
    while let Ok(msg) = rx.try_recv() {
        result.events.push(msg);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentOutput, GuideAgent, PlanAgent};
    use crate::document::Resume;
    use crate::llm::MockLlmClient;
    use crate::workflow::Plan;

    fn orchestrator(mock: Arc<MockLlmClient>) -> Orchestrator {
        let mut registry = AgentRegistry::new();
        let m = mock.clone();
        registry.register(move || PlanAgent::new(m.clone()));
        registry.register(move || GuideAgent::new(mock.clone()));
        Orchestrator::new(registry)
    }

    #[test]
    fn test_next_agent_resolution_order() {
        let mut orch = orchestrator(Arc::new(MockLlmClient::new()));
        let session = SessionState::new(Resume::default());
        let wait = AgentOutput::new(AgentAction::WaitInput, "");

        assert_eq!(orch.next_agent(PLAN_AGENT, &session, &wait).as_deref(), Some(GUIDE_AGENT));
        assert_eq!(orch.next_agent("unknown", &session, &wait), None);

        orch.set_router(GUIDE_AGENT, |s| {
            (s.stage == WorkflowStage::Init).then(|| "reviewer".to_string())
        });
        assert_eq!(orch.next_agent(GUIDE_AGENT, &session, &wait).as_deref(), Some("reviewer"));

        let handoff = AgentOutput::new(AgentAction::Continue, "").handoff_to("custom");
        assert_eq!(orch.next_agent(GUIDE_AGENT, &session, &handoff).as_deref(), Some("custom"));

        orch.set_route(EDITOR_AGENT, "done");
        assert_eq!(orch.next_agent(EDITOR_AGENT, &session, &wait).as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_preconditions_do_not_mutate() {
        let orch = orchestrator(Arc::new(MockLlmClient::new()));
        let mut session = SessionState::new(Resume::default());
        let before = session.clone();

        assert!(matches!(
            orch.advance_conversation(&mut session, "hi").await,
            Err(AgentError::NoPlan)
        ));
        assert!(matches!(orch.apply_change(&mut session).await, Err(AgentError::NoPendingChange)));
        assert!(matches!(orch.skip_current_task(&mut session), Err(AgentError::NoPlan)));
        assert!(matches!(orch.switch_to_task(&mut session, "x"), Err(AgentError::NoPlan)));
        assert_eq!(session, before);

        session.plan = Some(Plan::new(vec![Task::new(1, "Summary")]));
        session.pending_change = None;
        session.current_task_index = 1;
        let before = session.clone();
        assert!(matches!(orch.advance_task(&mut session), Err(AgentError::NoCurrentTask)));
        assert!(matches!(
            orch.switch_to_task(&mut session, "Education"),
            Err(AgentError::TaskNotFound(_))
        ));
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn test_unregistered_editor_is_precondition_error() {
        let orch = orchestrator(Arc::new(MockLlmClient::new()));
        let mut session = SessionState::new(Resume::default());
        session.plan = Some(Plan::new(vec![Task::new(1, "Summary")]));
        session.stage = WorkflowStage::Confirming;
        session.pending_change = Some(crate::workflow::PendingChange::from_draft(
            &Task::new(1, "Summary"),
            "x",
        ));
        let before = session.clone();
        let err = orch.apply_change(&mut session).await.unwrap_err();
        assert!(matches!(err, AgentError::AgentNotRegistered(ref n) if n == EDITOR_AGENT));
        assert!(err.is_precondition());
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn test_plan_failure_sets_error_stage() {
        let mock = Arc::new(MockLlmClient::scripted(["this is not a plan"]));
        let orch = orchestrator(mock);
        let mut session = SessionState::new(Resume::default());
        let err = orch.produce_plan(&mut session, "Backend role").await.unwrap_err();
        assert!(matches!(err, AgentError::JsonParseError(_)));
        assert_eq!(session.stage, WorkflowStage::Error);
        assert!(session.error_message.is_some());
        assert_eq!(session.user_intent.as_deref(), Some("Backend role"));
    }

    #[tokio::test]
    async fn test_empty_plan_completes_immediately() {
        let mock = Arc::new(MockLlmClient::scripted([r#"{"tasks": []}"#]));
        let orch = orchestrator(mock);
        let mut session = SessionState::new(Resume::default());
        let result = orch.produce_plan(&mut session, "anything").await.unwrap();
        assert_eq!(session.stage, WorkflowStage::Completed);
        assert_eq!(result.next_agent.as_deref(), Some(GUIDE_AGENT));
        assert!(!result.events.is_empty());
    }
}
