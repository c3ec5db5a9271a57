//! 工作流类型定义
//!
//! 修订计划（Plan / Task）与待确认变更（PendingChange）。Task 由 plan 一次性生成，之后只修改 status。

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 任务状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Confirmed,
    Completed,
    Skipped,
}

impl TaskStatus {
    /// 已完成或已跳过
    pub fn is_done(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }
}

/// 任务处理策略：深挖经历细节，或按岗位关键词筛选
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TaskStrategy {
    #[default]
    #[serde(rename = "DEEP_DIVE", alias = "STAR_STORYTELLING")]
    DeepDive,
    #[serde(rename = "FILTER", alias = "KEYWORD_FILTER")]
    Filter,
}

impl TaskStrategy {
    /// 宽松解析 LLM 给出的策略名，未知值回退为 DeepDive
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "FILTER" | "KEYWORD_FILTER" => TaskStrategy::Filter,
            _ => TaskStrategy::DeepDive,
        }
    }
}

/// 一条修订任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// 从 1 开始的唯一编号
    pub id: u32,
    #[serde(default)]
    pub status: TaskStatus,
    /// 简历中的具体板块，如 "工作经历 - 某公司"
    pub section: String,
    #[serde(default)]
    pub strategy: TaskStrategy,
    /// 待修改的原文片段
    #[serde(default)]
    pub original_text: String,
    /// 为什么这段内容不够好
    #[serde(default)]
    pub diagnosis: String,
    /// 修改后希望达到的效果
    #[serde(default)]
    pub goal: String,
    /// 板块内目标条目的 id（精确修改时使用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

impl Task {
    pub fn new(id: u32, section: impl Into<String>) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            section: section.into(),
            strategy: TaskStrategy::default(),
            original_text: String::new(),
            diagnosis: String::new(),
            goal: String::new(),
            item_id: None,
        }
    }

    pub fn with_strategy(mut self, strategy: TaskStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_diagnosis(mut self, diagnosis: impl Into<String>, goal: impl Into<String>) -> Self {
        self.diagnosis = diagnosis.into();
        self.goal = goal.into();
        self
    }

    pub fn with_original_text(mut self, text: impl Into<String>) -> Self {
        self.original_text = text.into();
        self
    }

    pub fn with_item_id(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }
}

/// 修订计划：有序任务列表，顺序即执行顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub tasks: Vec<Task>,
}

impl Plan {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

/// 变更操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOperation {
    UpdateBasics,
    UpdateListSection,
    UpdateFreeformSection,
    AddItem,
}

const BASICS_KEYWORDS: &[&str] = &["基本信息", "basics", "contact", "联系方式", "个人信息"];
const LIST_KEYWORDS: &[&str] = &[
    "经历",
    "实习",
    "工作",
    "experience",
    "employment",
    "internship",
    "work history",
];

impl ChangeOperation {
    /// 按板块名关键词判定操作类型（不区分大小写）
    pub fn classify(section: &str) -> Self {
        let lower = section.to_lowercase();
        if BASICS_KEYWORDS.iter().any(|k| lower.contains(k)) {
            ChangeOperation::UpdateBasics
        } else if LIST_KEYWORDS.iter().any(|k| lower.contains(k)) {
            ChangeOperation::UpdateListSection
        } else {
            ChangeOperation::UpdateFreeformSection
        }
    }
}

/// 待用户确认、待改写器执行的变更文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub task_id: u32,
    pub section_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    pub operation: ChangeOperation,
    #[serde(default)]
    pub changes: BTreeMap<String, serde_json::Value>,
    pub preview_text: String,
    #[serde(default)]
    pub reason: String,
}

impl PendingChange {
    /// 由当前任务与草稿构造变更文档
    pub fn from_draft(task: &Task, draft: &str) -> Self {
        let mut changes = BTreeMap::new();
        changes.insert("section".to_string(), task.section.clone().into());
        changes.insert("content".to_string(), draft.to_string().into());
        changes.insert(
            "item_id".to_string(),
            task.item_id
                .clone()
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        );
        changes.insert("original_text".to_string(), task.original_text.clone().into());

        Self {
            task_id: task.id,
            section_title: task.section.clone(),
            item_id: task.item_id.clone(),
            operation: ChangeOperation::classify(&task.section),
            changes,
            preview_text: draft.to_string(),
            reason: task.diagnosis.clone(),
        }
    }

    /// 变更中的字符串字段
    pub fn change_str(&self, key: &str) -> Option<&str> {
        self.changes.get(key).and_then(|v| v.as_str())
    }
}
