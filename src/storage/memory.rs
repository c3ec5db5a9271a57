//! 进程内会话存储

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::SessionState;

use super::{sort_by_recent, SessionMetadata, SessionStore, StoreError};

/// 记录以 JSON 文本保存，读取时重新解析，与文件存储的行为保持一致
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, (String, SessionMetadata)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: &SessionState, metadata: &SessionMetadata) -> Result<(), StoreError> {
        let json = session.to_json()?;
        self.records
            .write()
            .await
            .insert(session.session_id.clone(), (json, metadata.clone()));
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<SessionState, StoreError> {
        let records = self.records.read().await;
        let (json, _) = records
            .get(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        SessionState::from_json(json).map_err(|e| {
            tracing::warn!(session_id, error = %e, "Corrupt session record");
            StoreError::NotFound(session_id.to_string())
        })
    }

    async fn get_metadata(&self, session_id: &str) -> Result<SessionMetadata, StoreError> {
        self.records
            .read()
            .await
            .get(session_id)
            .map(|(_, meta)| meta.clone())
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.records.write().await.remove(session_id).is_some())
    }

    async fn list(&self) -> Result<Vec<SessionMetadata>, StoreError> {
        let mut list: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .map(|(_, meta)| meta.clone())
            .collect();
        sort_by_recent(&mut list);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Resume;
    use chrono::Utc;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemorySessionStore::new();
        let session = SessionState::new(Resume::default());
        let meta = SessionMetadata::from_session(&session, None, Utc::now());
        store.put(&session, &meta).await.unwrap();

        assert_eq!(store.get(&session.session_id).await.unwrap(), session);
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(store.delete(&session.session_id).await.unwrap());
        assert!(!store.delete(&session.session_id).await.unwrap());
        assert!(matches!(
            store.get(&session.session_id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
