//! Durable key-value storage for conversation histories.
//!
//! Defines the [`HistoryStore`] trait for async history load/save keyed
//! by a conversation identifier, and provides [`MemoryHistoryStore`] for
//! testing and ephemeral usage. Writes are last-write-wins; only one
//! session manager writes a given key.

pub mod fs;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::chat::message::ChatMessage;
use crate::error::Result;

/// Async conversation-history storage backend.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the history stored under `key`.
    ///
    /// Returns `Ok(None)` if nothing is stored. A corrupt stored value is
    /// an error; callers decide whether to discard or surface it.
    async fn load(&self, key: &str) -> Result<Option<Vec<ChatMessage>>>;

    /// Save (overwrite) the full history under `key`.
    async fn save(&self, key: &str, messages: &[ChatMessage]) -> Result<()>;

    /// Delete the history under `key`.
    ///
    /// Returns `Ok(())` even if the key did not exist.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory history store for testing and ephemeral usage.
///
/// Thread-safe and cheaply cloneable; contents are lost on drop.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    histories: Arc<RwLock<HashMap<String, Vec<ChatMessage>>>>,
}

impl MemoryHistoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<ChatMessage>>> {
        let histories = self.histories.read().await;
        Ok(histories.get(key).cloned())
    }

    async fn save(&self, key: &str, messages: &[ChatMessage]) -> Result<()> {
        let mut histories = self.histories.write().await;
        histories.insert(key.to_string(), messages.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut histories = self.histories.write().await;
        histories.remove(key);
        Ok(())
    }
}
