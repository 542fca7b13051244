//! Filesystem-backed history store.
//!
//! Each history is stored as `{data_dir}/{key}.json`. Writes are atomic
//! (temp file + fsync + rename) to prevent corruption on crash. Keys are
//! sanitized so a caller-supplied conversation identifier cannot escape
//! the data directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::HistoryStore;
use crate::chat::message::ChatMessage;
use crate::error::{AssistError, Result};

/// Filesystem-backed history store.
#[derive(Debug, Clone)]
pub struct FsHistoryStore {
    data_dir: PathBuf,
}

impl FsHistoryStore {
    /// Create a new filesystem store, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the directory cannot be created.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            AssistError::Storage(format!(
                "failed to create history directory {}: {e}",
                data_dir.display()
            ))
        })?;
        Ok(Self { data_dir })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the file path for a key.
    fn history_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.data_dir.join(format!("{}.json", sanitize_key(key)?)))
    }
}

/// Restrict keys to a filename-safe alphabet.
///
/// Rejects empty keys and anything that could traverse out of the data
/// directory.
fn sanitize_key(key: &str) -> Result<&str> {
    if key.is_empty() {
        return Err(AssistError::Storage("history key is empty".into()));
    }
    let ok = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !ok {
        return Err(AssistError::Storage(format!(
            "history key contains invalid characters: {key}"
        )));
    }
    Ok(key)
}

#[async_trait]
impl HistoryStore for FsHistoryStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<ChatMessage>>> {
        let path = self.history_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            AssistError::Storage(format!("failed to read {}: {e}", path.display()))
        })?;
        let messages = serde_json::from_str(&content).map_err(|e| {
            AssistError::Storage(format!("failed to parse {}: {e}", path.display()))
        })?;
        Ok(Some(messages))
    }

    async fn save(&self, key: &str, messages: &[ChatMessage]) -> Result<()> {
        let path = self.history_path(key)?;
        let json = serde_json::to_string_pretty(messages)
            .map_err(|e| AssistError::Storage(format!("failed to serialize history: {e}")))?;

        // Write to a temp file in the same directory so the rename is atomic.
        let tmp_path = self.data_dir.join(format!(".{}.tmp", sanitize_key(key)?));
        std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| {
            AssistError::Storage(format!("failed to write {}: {e}", tmp_path.display()))
        })?;

        if let Ok(file) = std::fs::File::open(&tmp_path) {
            let _ = file.sync_all();
        }

        std::fs::rename(&tmp_path, &path).map_err(|e| {
            AssistError::Storage(format!("failed to rename into {}: {e}", path.display()))
        })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.history_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AssistError::Storage(format!(
                "failed to delete {}: {e}",
                path.display()
            ))),
        }
    }
}
