//! File-based range store.
//!
//! Each business tag is a JSON document updated under an exclusive `flock`
//! held across read-modify-write, so several processes (or several store
//! instances) sharing the directory never claim overlapping ranges.
//! Suitable for development and single-node deployments.
//!
//! Directory structure:
//! ```text
//! data/
//! └── segments/
//!     └── {biz_tag}.json
//! ```

use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::Mutex;

use crate::config::FileStorageConfig;
use crate::domain::SegmentState;
use crate::error::{StorageError, StorageResult};
use crate::storage::traits::RangeStore;

/// File-based range store implementation.
pub struct FileRangeStore {
    /// Base data directory.
    base_dir: PathBuf,
    /// Directory for segment files.
    segments_dir: PathBuf,
    /// Mutex for coordinating file operations within this instance.
    lock: Mutex<()>,
}

impl FileRangeStore {
    /// Create a new file range store.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directories cannot be created.
    pub fn new(config: &FileStorageConfig) -> StorageResult<Self> {
        let base_dir = config.data_dir.clone();
        let segments_dir = base_dir.join("segments");

        std::fs::create_dir_all(&segments_dir).map_err(|e| {
            StorageError::FileIO(format!(
                "Failed to create directory {}: {e}",
                segments_dir.display()
            ))
        })?;

        Ok(Self {
            base_dir,
            segments_dir,
            lock: Mutex::new(()),
        })
    }

    /// Get the file path for a tag.
    fn segment_path(&self, biz_tag: &str) -> PathBuf {
        self.segments_dir
            .join(format!("{}.json", sanitize_name(biz_tag)))
    }

    /// Write a fresh state file with exclusive lock.
    fn write_state_locked(path: &Path, state: &SegmentState) -> StorageResult<()> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;

        file.lock_exclusive()
            .map_err(|e| StorageError::LockFailed(e.to_string()))?;

        serde_json::to_writer_pretty(&file, state)?;
        file.sync_all()?;
        file.unlock()
            .map_err(|e| StorageError::LockFailed(e.to_string()))?;

        Ok(())
    }

    /// Atomically apply `update_fn` to the tag's state.
    fn update_state<F>(&self, biz_tag: &str, update_fn: F) -> StorageResult<SegmentState>
    where
        F: FnOnce(&mut SegmentState) -> StorageResult<()>,
    {
        let path = self.segment_path(biz_tag);

        if !path.exists() {
            return Err(StorageError::NotFound(format!(
                "Segment '{biz_tag}' not found"
            )));
        }

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)?;

        file.lock_exclusive()
            .map_err(|e| StorageError::LockFailed(e.to_string()))?;

        let result = (|| -> StorageResult<SegmentState> {
            let mut state: SegmentState = serde_json::from_reader(&file)?;

            update_fn(&mut state)?;

            state.version += 1;
            state.updated_at = chrono::Utc::now().timestamp_millis();

            file.seek(SeekFrom::Start(0))?;
            file.set_len(0)?;

            let json = serde_json::to_string_pretty(&state)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;

            Ok(state)
        })();

        file.unlock()
            .map_err(|e| StorageError::LockFailed(e.to_string()))?;

        result
    }
}

#[async_trait]
impl RangeStore for FileRangeStore {
    async fn initialize(&self, biz_tag: &str, step: i64) -> StorageResult<()> {
        let _guard = self.lock.lock().await;

        let path = self.segment_path(biz_tag);

        // Don't overwrite an existing row
        if path.exists() {
            return Ok(());
        }

        let state = SegmentState::new(biz_tag.to_string(), step);
        match Self::write_state_locked(&path, &state) {
            Err(StorageError::FileIO(_)) if path.exists() => Ok(()),
            other => other,
        }
    }

    async fn claim(&self, biz_tag: &str, step: i64) -> StorageResult<i64> {
        let _guard = self.lock.lock().await;

        let state = self.update_state(biz_tag, |state| {
            state.max_id = state.max_id.checked_add(step).ok_or_else(|| {
                StorageError::Query(format!("max_id overflow for '{biz_tag}'"))
            })?;
            Ok(())
        })?;

        Ok(state.max_id)
    }

    async fn health_check(&self) -> StorageResult<()> {
        if !self.base_dir.exists() {
            return Err(StorageError::Unavailable);
        }

        let test_file = self.base_dir.join(".health_check");
        tokio::fs::write(&test_file, b"ok")
            .await
            .map_err(|e| StorageError::FileIO(format!("Health check failed: {e}")))?;
        tokio::fs::remove_file(&test_file)
            .await
            .map_err(|e| StorageError::FileIO(format!("Health check cleanup failed: {e}")))?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Sanitize a name for use as a filename.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store() -> (FileRangeStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = FileStorageConfig {
            data_dir: temp_dir.path().to_path_buf(),
        };
        let store = FileRangeStore::new(&config).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_health_check() {
        let (store, _temp) = create_test_store();
        assert!(store.health_check().await.is_ok());
        assert_eq!(store.backend_name(), "file");
    }

    #[tokio::test]
    async fn test_claim_adds_step() {
        let (store, _temp) = create_test_store();
        store.initialize("orders", 100).await.unwrap();

        assert_eq!(store.claim("orders", 100).await.unwrap(), 100);
        assert_eq!(store.claim("orders", 100).await.unwrap(), 200);
        assert_eq!(store.claim("orders", 5).await.unwrap(), 205);
    }

    #[tokio::test]
    async fn test_claim_unknown_tag() {
        let (store, _temp) = create_test_store();
        let result = store.claim("missing", 10).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (store, _temp) = create_test_store();
        store.initialize("orders", 10).await.unwrap();
        store.claim("orders", 10).await.unwrap();

        store.initialize("orders", 10).await.unwrap();
        assert_eq!(store.claim("orders", 10).await.unwrap(), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_separate_instances_share_the_row() {
        let temp_dir = TempDir::new().unwrap();
        let config = FileStorageConfig {
            data_dir: temp_dir.path().to_path_buf(),
        };
        let first = Arc::new(FileRangeStore::new(&config).unwrap());
        let second = Arc::new(FileRangeStore::new(&config).unwrap());
        first.initialize("shared", 10).await.unwrap();

        let mut handles = Vec::new();
        for store in [first, second] {
            handles.push(tokio::spawn(async move {
                let mut maxes = Vec::new();
                for _ in 0..25 {
                    maxes.push(store.claim("shared", 10).await.unwrap());
                }
                maxes
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (1..=50).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("simple"), "simple");
        assert_eq!(sanitize_name("with-dash"), "with-dash");
        assert_eq!(sanitize_name("with/slash"), "with_slash");
        assert_eq!(sanitize_name("with space"), "with_space");
    }
}
