//! 会话状态
//!
//! 一次简历优化会话的唯一可变记录：修订计划、当前位置、各 Agent 检查点、待确认变更。
//! 只有 Orchestrator 会修改它；Agent 拿到的是只读引用。
//!
//! 不变式：
//! - `0 <= current_task_index <= plan.len()`，等于 `plan.len()` 表示没有当前任务
//! - `pending_change` 非空时 stage 必为 CONFIRMING / APPLYING（ERROR 阶段保留失败前的变更，便于重试）

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agents::{AgentCheckpoint, GUIDE_AGENT};
use crate::document::Resume;
use crate::workflow::{PendingChange, Plan, Task, TaskStatus};

/// 工作流阶段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStage {
    #[default]
    Init,
    Planning,
    Guiding,
    Confirming,
    Applying,
    Completed,
    Error,
}

/// 单个任务的进度摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: u32,
    pub section: String,
    pub status: TaskStatus,
}

/// 进度快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub current_index: usize,
    pub current_task: Option<Task>,
    pub tasks: Vec<TaskSummary>,
}

impl Progress {
    pub fn done(&self) -> usize {
        self.completed + self.skipped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub document: Resume,
    #[serde(default)]
    pub user_intent: Option<String>,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub stage: WorkflowStage,
    #[serde(default)]
    pub current_task_index: usize,
    #[serde(default)]
    pub pending_change: Option<PendingChange>,
    /// agent 名 -> 检查点；无状态 Agent 不占条目
    #[serde(default)]
    pub agent_checkpoints: BTreeMap<String, AgentCheckpoint>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl SessionState {
    pub fn new(document: Resume) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), document)
    }

    pub fn with_id(session_id: impl Into<String>, document: Resume) -> Self {
        Self {
            session_id: session_id.into(),
            document,
            user_intent: None,
            plan: None,
            stage: WorkflowStage::Init,
            current_task_index: 0,
            pending_change: None,
            agent_checkpoints: BTreeMap::new(),
            error_message: None,
        }
    }

    pub fn task_count(&self) -> usize {
        self.plan.as_ref().map(Plan::len).unwrap_or(0)
    }

    /// 当前任务；没有计划或索引越过末尾时为 None
    pub fn current_task(&self) -> Option<&Task> {
        self.plan
            .as_ref()
            .and_then(|p| p.tasks.get(self.current_task_index))
    }

    pub fn task(&self, index: usize) -> Option<&Task> {
        self.plan.as_ref().and_then(|p| p.tasks.get(index))
    }

    /// 修改任务状态，返回是否找到该任务
    pub fn set_task_status(&mut self, task_id: u32, status: TaskStatus) -> bool {
        let task = self
            .plan
            .as_mut()
            .and_then(|p| p.tasks.iter_mut().find(|t| t.id == task_id));
        match task {
            Some(t) => {
                t.status = status;
                true
            }
            None => false,
        }
    }

    /// 存在计划且所有任务均为 COMPLETED / SKIPPED
    pub fn all_tasks_done(&self) -> bool {
        self.plan
            .as_ref()
            .map(|p| p.tasks.iter().all(|t| t.status.is_done()))
            .unwrap_or(false)
    }

    pub fn checkpoint(&self, agent: &str) -> Option<&AgentCheckpoint> {
        self.agent_checkpoints.get(agent)
    }

    /// 写入检查点；Empty 检查点不落盘，同时清掉旧值
    pub fn save_checkpoint(&mut self, agent: &str, checkpoint: AgentCheckpoint) {
        if checkpoint.is_empty() {
            self.agent_checkpoints.remove(agent);
        } else {
            self.agent_checkpoints.insert(agent.to_string(), checkpoint);
        }
    }

    pub fn clear_checkpoint(&mut self, agent: &str) {
        self.agent_checkpoints.remove(agent);
    }

    /// 前进到下一个任务：清空待确认变更与 guide 检查点，越过末尾时进入 COMPLETED
    pub fn advance_task(&mut self) {
        let total = self.task_count();
        self.current_task_index = (self.current_task_index + 1).min(total);
        self.pending_change = None;
        self.clear_checkpoint(GUIDE_AGENT);
        self.stage = if self.current_task().is_some() {
            WorkflowStage::Guiding
        } else {
            WorkflowStage::Completed
        };
    }

    /// 跳过当前任务（已完成的任务保持 COMPLETED）并前进
    pub fn skip_current_task(&mut self) -> Option<Task> {
        let task = self.current_task()?.clone();
        if task.status != TaskStatus::Completed {
            self.set_task_status(task.id, TaskStatus::Skipped);
        }
        self.advance_task();
        Some(task)
    }

    /// 按标签查找任务：精确匹配 > 双向包含 > 空白分词后的关键词重叠（不区分大小写）
    pub fn find_task_index(&self, label: &str) -> Option<usize> {
        let tasks = &self.plan.as_ref()?.tasks;
        let label = label.trim();
        if label.is_empty() {
            return None;
        }
        if let Some(i) = tasks.iter().position(|t| t.section == label) {
            return Some(i);
        }
        if let Some(i) = tasks
            .iter()
            .position(|t| t.section.contains(label) || label.contains(t.section.as_str()))
        {
            return Some(i);
        }
        let lower = label.to_lowercase();
        let keywords: Vec<&str> = lower.split_whitespace().collect();
        tasks.iter().position(|t| {
            let section = t.section.to_lowercase();
            keywords.iter().any(|k| section.contains(k))
        })
    }

    /// 切换到匹配的任务；未命中时不做任何修改
    pub fn switch_to_task(&mut self, label: &str) -> Option<usize> {
        let idx = self.find_task_index(label)?;
        self.current_task_index = idx;
        if let Some(id) = self.task(idx).map(|t| t.id) {
            self.set_task_status(id, TaskStatus::InProgress);
        }
        self.pending_change = None;
        self.clear_checkpoint(GUIDE_AGENT);
        self.stage = WorkflowStage::Guiding;
        Some(idx)
    }

    pub fn progress(&self) -> Progress {
        let Some(plan) = &self.plan else {
            return Progress::default();
        };
        Progress {
            total: plan.len(),
            completed: plan.count(TaskStatus::Completed),
            skipped: plan.count(TaskStatus::Skipped),
            current_index: self.current_task_index,
            current_task: self.current_task().cloned(),
            tasks: plan
                .tasks
                .iter()
                .map(|t| TaskSummary {
                    id: t.id,
                    section: t.section.clone(),
                    status: t.status,
                })
                .collect(),
        }
    }

    /// 记录失败：stage=ERROR，保留其他字段
    pub fn fail(&mut self, message: impl Into<String>) {
        self.stage = WorkflowStage::Error;
        self.error_message = Some(message.into());
    }

    /// 检查不变式，违反时返回描述
    pub fn check_invariants(&self) -> Result<(), String> {
        let total = self.task_count();
        if self.current_task_index > total {
            return Err(format!(
                "current_task_index {} exceeds task count {}",
                self.current_task_index, total
            ));
        }
        // 执行失败时除 stage 置为 ERROR 外会话保持原样，待确认变更留着供重试 apply
        if self.pending_change.is_some()
            && !matches!(
                self.stage,
                WorkflowStage::Confirming | WorkflowStage::Applying | WorkflowStage::Error
            )
        {
            return Err(format!("pending_change present in stage {:?}", self.stage));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}
