//! Durable storage for the engine state.
//!
//! The whole [`EngineState`] is loaded once at startup and saved whole after
//! every mutation. Stores only move bytes; they never interpret the state.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tablesync_engine::EngineState;
use tokio::io::AsyncWriteExt;

/// Failure of a durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Key-value persistence for the engine state.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Loads the last saved state, or `None` if nothing was saved yet.
    async fn load(&self) -> Result<Option<EngineState>, StoreError>;

    /// Replaces the saved state.
    async fn save(&self, state: &EngineState) -> Result<(), StoreError>;
}

/// Keeps the state in memory. Used by tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: parking_lot::Mutex<Option<EngineState>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a previously saved state.
    pub fn with_state(state: EngineState) -> Self {
        Self {
            state: parking_lot::Mutex::new(Some(state)),
            saves: AtomicUsize::new(0),
        }
    }

    /// The last saved state.
    pub fn snapshot(&self) -> Option<EngineState> {
        self.state.lock().clone()
    }

    /// How many times `save` was called.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn load(&self) -> Result<Option<EngineState>, StoreError> {
        Ok(self.state.lock().clone())
    }

    async fn save(&self, state: &EngineState) -> Result<(), StoreError> {
        *self.state.lock() = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Writes the state as one JSON document.
///
/// Saves go to `<path>.tmp` first and are renamed over the target, so a
/// crash mid-write leaves the previous state intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn load(&self) -> Result<Option<EngineState>, StoreError> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        EngineState::from_json(&json)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn save(&self, state: &EngineState) -> Result<(), StoreError> {
        let json = state
            .to_json_pretty()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Data must be on disk before the rename makes it visible.
        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::trace!(path = %self.path.display(), "State saved");
        Ok(())
    }
}
