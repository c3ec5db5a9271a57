//! 会话存储：检查点记录 + 用于列表展示的元数据记录
//!
//! - **memory**: 进程内存储（测试、临时会话）
//! - **file**: `<root>/<session_id>/{workflow_state.json, metadata.json}`
//! - **manager**: 带缓存的会话管理（创建 / 读取 / 保存 / 重命名 / 删除 / 列表）
//! - **naming**: 职位 / 公司提取与默认会话名
//!
//! 写入均为整条记录覆盖；读到损坏的记录按“不存在”处理。

pub mod file;
pub mod manager;
pub mod memory;
pub mod naming;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::core::{SessionState, WorkflowStage};

pub use file::FileSessionStore;
pub use manager::SessionManager;
pub use memory::MemorySessionStore;
pub use naming::{extract_job_info, generate_session_name, JobInfo};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialize(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
}

/// 会话元数据：列表展示用，不含文档与检查点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: String,
    pub name: Option<String>,
    pub job_title: Option<String>,
    pub job_company: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub progress: ProgressCounts,
    pub status: SessionStatus,
}

impl SessionMetadata {
    /// 由会话状态生成元数据；名称与创建时间由调用方沿用旧值
    pub fn from_session(session: &SessionState, name: Option<String>, created_at: DateTime<Utc>) -> Self {
        let intent = session.user_intent.as_deref().unwrap_or("");
        let job = extract_job_info(intent);
        let progress = session.progress();
        let status = if session.stage == WorkflowStage::Completed {
            SessionStatus::Completed
        } else {
            SessionStatus::Active
        };
        Self {
            id: session.session_id.clone(),
            name,
            job_title: job.title,
            job_company: job.company,
            created_at,
            updated_at: Utc::now(),
            progress: ProgressCounts {
                total: progress.total,
                completed: progress.completed,
                skipped: progress.skipped,
            },
            status,
        }
    }
}

/// 持久化存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 覆盖写入会话状态与元数据
    async fn put(&self, session: &SessionState, metadata: &SessionMetadata) -> Result<(), StoreError>;

    async fn get(&self, session_id: &str) -> Result<SessionState, StoreError>;

    async fn get_metadata(&self, session_id: &str) -> Result<SessionMetadata, StoreError>;

    /// 删除会话；不存在时返回 false
    async fn delete(&self, session_id: &str) -> Result<bool, StoreError>;

    /// 所有会话元数据，按 updated_at 倒序
    async fn list(&self) -> Result<Vec<SessionMetadata>, StoreError>;
}

pub(crate) fn sort_by_recent(list: &mut [SessionMetadata]) {
    list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

/// 根据 `[storage] backend` 创建存储（file | memory）
pub fn create_session_store(cfg: &AppConfig) -> Arc<dyn SessionStore> {
    match cfg.storage.backend.to_lowercase().as_str() {
        "memory" => {
            tracing::info!("Using in-memory session store");
            Arc::new(MemorySessionStore::new())
        }
        other => {
            if other != "file" {
                tracing::warn!(backend = other, "Unknown storage backend, falling back to file");
            }
            let store = FileSessionStore::new(cfg.storage.root_or_default());
            tracing::info!(root = %store.root().display(), "Using file session store");
            Arc::new(store)
        }
    }
}
