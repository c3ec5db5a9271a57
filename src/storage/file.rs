//! 文件会话存储
//!
//! ```text
//! <root>/
//!   └── <session_id>/
//!         ├── metadata.json        列表查询用
//!         └── workflow_state.json  完整会话状态
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::SessionState;

use super::{sort_by_recent, SessionMetadata, SessionStore, StoreError};

const STATE_FILE: &str = "workflow_state.json";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 会话目录；含路径分隔符或 `.` 的 id 不对应任何会话
    fn session_dir(&self, session_id: &str) -> Option<PathBuf> {
        let invalid = session_id.is_empty()
            || session_id.contains(&['/', '\\', '.'][..]);
        (!invalid).then(|| self.root.join(session_id))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        session_id: &str,
        file: &str,
    ) -> Result<T, StoreError> {
        let path = self
            .session_dir(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?
            .join(file);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(session_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&data).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt session record");
            StoreError::NotFound(session_id.to_string())
        })
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn put(&self, session: &SessionState, metadata: &SessionMetadata) -> Result<(), StoreError> {
        let dir = self.session_dir(&session.session_id).ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid session id: {}", session.session_id),
            )
        })?;
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(STATE_FILE), session.to_json()?).await?;
        tokio::fs::write(dir.join(METADATA_FILE), serde_json::to_string_pretty(metadata)?).await?;
        tracing::debug!(session_id = %session.session_id, dir = %dir.display(), "Session saved");
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<SessionState, StoreError> {
        self.read_json(session_id, STATE_FILE).await
    }

    async fn get_metadata(&self, session_id: &str) -> Result<SessionMetadata, StoreError> {
        self.read_json(session_id, METADATA_FILE).await
    }

    async fn delete(&self, session_id: &str) -> Result<bool, StoreError> {
        let Some(dir) = self.session_dir(session_id) else {
            return Ok(false);
        };
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(session_id, "Session deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<SessionMetadata>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut list = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path().join(METADATA_FILE);
            let Ok(data) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<SessionMetadata>(&data) {
                Ok(meta) => list.push(meta),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping invalid session"),
            }
        }
        sort_by_recent(&mut list);
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Resume;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        let mut session = SessionState::new(Resume::default());
        session.user_intent = Some("intent".to_string());
        let meta = SessionMetadata::from_session(&session, Some("n".to_string()), Utc::now());
        store.put(&session, &meta).await.unwrap();

        assert!(dir.path().join(&session.session_id).join(STATE_FILE).exists());
        assert_eq!(store.get(&session.session_id).await.unwrap(), session);
        assert_eq!(store.get_metadata(&session.session_id).await.unwrap(), meta);
    }

    #[tokio::test]
    async fn test_corrupt_record_reads_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        std::fs::create_dir_all(dir.path().join("broken")).unwrap();
        std::fs::write(dir.path().join("broken").join(STATE_FILE), "{not json").unwrap();
        std::fs::write(dir.path().join("broken").join(METADATA_FILE), "[]").unwrap();

        assert!(matches!(store.get("broken").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.get("missing").await, Err(StoreError::NotFound(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sorted_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions"));
        assert!(store.list().await.unwrap().is_empty());

        let older = SessionState::with_id("older", Resume::default());
        let newer = SessionState::with_id("newer", Resume::default());
        let mut old_meta = SessionMetadata::from_session(&older, None, Utc::now());
        old_meta.updated_at = Utc::now() - Duration::hours(1);
        store.put(&older, &old_meta).await.unwrap();
        store
            .put(&newer, &SessionMetadata::from_session(&newer, None, Utc::now()))
            .await
            .unwrap();

        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["newer", "older"]);

        assert!(store.delete("older").await.unwrap());
        assert!(!store.delete("older").await.unwrap());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ids_with_path_characters_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("sessions");
        let store = FileSessionStore::new(&root);
        assert_eq!(store.root(), root.as_path());

        let plain = SessionState::with_id("a_b", Resume::default());
        store
            .put(&plain, &SessionMetadata::from_session(&plain, None, Utc::now()))
            .await
            .unwrap();

        for bad in ["a.b", "../x", "a/b", "a\\b", ""] {
            let session = SessionState::with_id(bad, Resume::default());
            let meta = SessionMetadata::from_session(&session, None, Utc::now());
            assert!(matches!(store.put(&session, &meta).await, Err(StoreError::Io(_))), "{bad}");
            assert!(matches!(store.get(bad).await, Err(StoreError::NotFound(_))), "{bad}");
            assert!(!store.delete(bad).await.unwrap(), "{bad}");
        }

        // "a.b" 不再被改写成 "a_b"
        assert!(matches!(store.get("a.b").await, Err(StoreError::NotFound(_))));
        assert_eq!(store.get("a_b").await.unwrap(), plain);
        assert!(!dir.path().join("x").exists());
    }
}
