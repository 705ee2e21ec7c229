//! Local file backend
//!
//! Stores state as pretty JSON (default `xcform.state.json`) next to a
//! `.lock` file. Writes go through a temporary file and a rename so a crash
//! never leaves a truncated state behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::lock::LockInfo;
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "xcform.state.json";

    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STATE_FILE))
    }

    pub fn with_path(state_path: PathBuf) -> Self {
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match tokio::fs::read_to_string(&self.lock_path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(lock) => Ok(Some(lock)),
                Err(e) => Err(BackendError::InvalidState(format!(
                    "Failed to parse lock file: {}",
                    e
                ))),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::Io(format!("Failed to read lock file: {}", e))),
        }
    }

    async fn remove_lock_file(&self) -> BackendResult<()> {
        tokio::fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to remove lock file: {}", e)))
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match tokio::fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::Io(format!("Failed to read state file: {}", e))),
        };

        let state: StateFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::InvalidState(format!("Failed to parse state file: {}", e))
        })?;
        if state.version > StateFile::CURRENT_VERSION {
            return Err(BackendError::InvalidState(format!(
                "state format version {} is newer than supported version {}",
                state.version,
                StateFile::CURRENT_VERSION
            )));
        }
        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(stored) = self.read_state().await? {
            if stored.lineage != state.lineage {
                return Err(BackendError::LineageMismatch {
                    expected: stored.lineage,
                    actual: state.lineage.clone(),
                });
            }
            if stored.serial > state.serial {
                return Err(BackendError::StaleSerial {
                    stored: stored.serial,
                    writing: state.serial,
                });
            }
        }

        let content = serde_json::to_string_pretty(state).map_err(|e| {
            BackendError::Serialization(format!("Failed to serialize state: {}", e))
        })?;

        let tmp_path = self.state_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;
        tokio::fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to replace state file: {}", e)))?;

        log::debug!(
            "Wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        match self.read_lock().await {
            Ok(Some(existing)) if !existing.is_expired() => {
                return Err(BackendError::locked(&existing));
            }
            Ok(Some(existing)) => {
                log::warn!(
                    "Replacing expired lock {} held by {}",
                    existing.id,
                    existing.who
                );
                self.remove_lock_file().await?;
            }
            Ok(None) => {}
            Err(BackendError::InvalidState(message)) => {
                log::warn!("Replacing unreadable lock file: {}", message);
                self.remove_lock_file().await?;
            }
            Err(e) => return Err(e),
        }

        let lock = LockInfo::new(operation);
        let content = serde_json::to_string_pretty(&lock)
            .map_err(|e| BackendError::Serialization(format!("Failed to serialize lock: {}", e)))?;

        // create_new: a concurrent run that wins the race keeps its lock
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return match self.read_lock().await? {
                    Some(holder) => Err(BackendError::locked(&holder)),
                    None => Err(BackendError::Io("lock file vanished while locking".to_string())),
                };
            }
            Err(e) => return Err(BackendError::Io(format!("Failed to create lock file: {}", e))),
        };
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write lock file: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write lock file: {}", e)))?;

        Ok(lock)
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;

        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }
        self.remove_lock_file().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        match self.read_lock().await {
            Ok(None) => return Err(BackendError::LockNotFound(lock_id.to_string())),
            Ok(Some(existing)) if existing.id != lock_id => {
                return Err(BackendError::LockMismatch {
                    expected: lock_id.to_string(),
                    actual: existing.id,
                });
            }
            // An unreadable lock can always be forced
            Ok(Some(_)) | Err(BackendError::InvalidState(_)) => {}
            Err(e) => return Err(e),
        }
        self.remove_lock_file().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResourceState;
    use chrono::Duration;
    use tempfile::tempdir;

    fn backend(dir: &tempfile::TempDir) -> LocalBackend {
        LocalBackend::with_path(dir.path().join("test.state.json"))
    }

    #[tokio::test]
    async fn read_write_round_trip() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);
        assert!(backend.read_state().await.unwrap().is_none());

        let mut state = StateFile::new();
        state.upsert(ResourceState::new("healthcheck", "shared/hc", "f5xc"));
        state.increment_serial();
        backend.write_state(&state).await.unwrap();

        let read = backend.read_state().await.unwrap().unwrap();
        assert_eq!(read.serial, 1);
        assert_eq!(read.lineage, state.lineage);
        assert!(read.find("healthcheck", "shared/hc").is_some());
        assert!(!dir.path().join("test.state.json.tmp").exists());
    }

    #[tokio::test]
    async fn refuses_foreign_lineage() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);
        backend.write_state(&StateFile::new()).await.unwrap();

        let err = backend.write_state(&StateFile::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::LineageMismatch { .. }));
    }

    #[tokio::test]
    async fn refuses_stale_serial() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);
        let mut state = StateFile::new();
        state.increment_serial();
        state.increment_serial();
        backend.write_state(&state).await.unwrap();

        let stale = StateFile::with_lineage(state.lineage.clone());
        let err = backend.write_state(&stale).await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::StaleSerial {
                stored: 2,
                writing: 0
            }
        ));
    }

    #[tokio::test]
    async fn corrupt_state_is_reported() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);
        std::fs::write(backend.state_path(), "{not json").unwrap();

        let err = backend.read_state().await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidState(_)));
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert_eq!(lock.operation, "apply");
        assert!(backend.lock_path().exists());

        let err = backend.acquire_lock("destroy").await.unwrap_err();
        assert!(matches!(err, BackendError::Locked { ref operation, .. } if operation == "apply"));

        backend.release_lock(&lock).await.unwrap();
        assert!(!backend.lock_path().exists());

        let again = backend.acquire_lock("destroy").await.unwrap();
        backend.release_lock(&again).await.unwrap();
    }

    #[tokio::test]
    async fn expired_lock_is_replaced() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);
        let stale = LockInfo::with_ttl("apply", Duration::seconds(-1));
        std::fs::write(backend.lock_path(), serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = backend.acquire_lock("apply").await.unwrap();
        assert_ne!(lock.id, stale.id);
    }

    #[tokio::test]
    async fn release_checks_lock_id() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);
        let held = backend.acquire_lock("apply").await.unwrap();

        let other = LockInfo::new("apply");
        let err = backend.release_lock(&other).await.unwrap_err();
        assert!(matches!(err, BackendError::LockMismatch { .. }));

        backend.release_lock(&held).await.unwrap();
        let err = backend.release_lock(&held).await.unwrap_err();
        assert!(matches!(err, BackendError::LockNotFound(_)));
    }

    #[tokio::test]
    async fn force_unlock_removes_matching_lock() {
        let dir = tempdir().unwrap();
        let backend = backend(&dir);
        let held = backend.acquire_lock("apply").await.unwrap();

        let err = backend.force_unlock("other-id").await.unwrap_err();
        assert!(matches!(err, BackendError::LockMismatch { .. }));

        backend.force_unlock(&held.id).await.unwrap();
        assert!(!backend.lock_path().exists());
    }

    #[test]
    fn lock_sits_next_to_state() {
        let backend = LocalBackend::default();
        assert_eq!(backend.state_path(), Path::new("xcform.state.json"));
        assert_eq!(backend.lock_path(), Path::new("xcform.state.lock"));

        let backend = LocalBackend::with_path(PathBuf::from("envs/prod.json"));
        assert_eq!(backend.lock_path(), Path::new("envs/prod.lock"));
    }
}
