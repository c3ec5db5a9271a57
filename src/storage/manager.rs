//! 会话管理：进程内缓存 + 持久化存储
//!
//! 缓存只保护自身的 map；同一会话的并发修改由调用方串行化。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::core::SessionState;
use crate::document::Resume;

use super::{generate_session_name, SessionMetadata, SessionStore, StoreError};

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cache: RwLock<HashMap<String, SessionState>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// 新建会话并立即落盘
    pub async fn create(&self, document: Resume) -> Result<SessionState, StoreError> {
        let session = SessionState::new(document);
        let meta = SessionMetadata::from_session(&session, None, Utc::now());
        self.store.put(&session, &meta).await?;
        self.cache
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        tracing::info!(session_id = %session.session_id, "Session created");
        Ok(session)
    }

    /// 先查缓存，未命中时从存储恢复
    pub async fn get(&self, session_id: &str) -> Result<SessionState, StoreError> {
        if let Some(s) = self.cache.read().await.get(session_id) {
            return Ok(s.clone());
        }
        let session = self.store.get(session_id).await?;
        tracing::info!(session_id, stage = ?session.stage, "Session restored from store");
        self.cache
            .write()
            .await
            .insert(session_id.to_string(), session.clone());
        Ok(session)
    }

    /// 保存会话；沿用已有的名称与创建时间，尚无名称且已有求职意向时生成默认名称
    pub async fn save(&self, session: &SessionState) -> Result<SessionMetadata, StoreError> {
        let previous = self.store.get_metadata(&session.session_id).await.ok();
        let created_at = previous.as_ref().map(|m| m.created_at).unwrap_or_else(Utc::now);
        let name = previous.and_then(|m| m.name).or_else(|| {
            session
                .user_intent
                .as_deref()
                .map(|intent| generate_session_name(&session.document, intent))
        });
        let meta = SessionMetadata::from_session(session, name, created_at);
        self.store.put(session, &meta).await?;
        self.cache
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        tracing::debug!(session_id = %session.session_id, stage = ?session.stage, "Session saved");
        Ok(meta)
    }

    pub async fn rename(&self, session_id: &str, name: &str) -> Result<SessionMetadata, StoreError> {
        let session = self.get(session_id).await?;
        let mut meta = self.store.get_metadata(session_id).await?;
        meta.name = Some(name.trim().to_string());
        meta.updated_at = Utc::now();
        self.store.put(&session, &meta).await?;
        tracing::info!(session_id, name = %name.trim(), "Session renamed");
        Ok(meta)
    }

    pub async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        self.cache.write().await.remove(session_id);
        self.store.delete(session_id).await
    }

    pub async fn metadata(&self, session_id: &str) -> Result<SessionMetadata, StoreError> {
        self.store.get_metadata(session_id).await
    }

    pub async fn list(&self) -> Result<Vec<SessionMetadata>, StoreError> {
        self.store.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileSessionStore, MemorySessionStore};

    #[tokio::test]
    async fn test_save_names_session_and_keeps_created_at() {
        let manager = SessionManager::new(Arc::new(MemorySessionStore::new()));
        let mut doc = Resume::default();
        doc.basics.name = "李四".to_string();
        let mut session = manager.create(doc).await.unwrap();
        let created = manager.metadata(&session.session_id).await.unwrap();
        assert_eq!(created.name, None);

        session.user_intent = Some("华为 测试工程师".to_string());
        let meta = manager.save(&session).await.unwrap();
        assert_eq!(meta.name.as_deref(), Some("李四 - 测试工程师 - 华为"));
        assert_eq!(meta.created_at, created.created_at);

        let renamed = manager.rename(&session.session_id, " 我的会话 ").await.unwrap();
        assert_eq!(renamed.name.as_deref(), Some("我的会话"));
        let meta = manager.save(&session).await.unwrap();
        assert_eq!(meta.name.as_deref(), Some("我的会话"));
    }

    #[tokio::test]
    async fn test_get_restores_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(dir.path()));
        let id = {
            let manager = SessionManager::new(store.clone());
            let mut session = manager.create(Resume::default()).await.unwrap();
            session.user_intent = Some("Rust developer".to_string());
            manager.save(&session).await.unwrap();
            session.session_id
        };

        let manager = SessionManager::new(store);
        let restored = manager.get(&id).await.unwrap();
        assert_eq!(restored.user_intent.as_deref(), Some("Rust developer"));
        assert_eq!(manager.list().await.unwrap().len(), 1);

        assert!(manager.delete(&id).await.unwrap());
        assert!(matches!(manager.get(&id).await, Err(StoreError::NotFound(_))));
    }
}
