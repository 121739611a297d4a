//! # Tablesync Client
//!
//! The async half of the offline-first sync client. It wraps the pure
//! [`tablesync_engine`] state with a backend connection, durable storage,
//! a connectivity signal and background triggers.
//!
//! ## Flow
//!
//! A mutation first tries the backend when online. If the call fails with
//! a retryable error, or the device is offline, the change is applied to
//! the local cache right away and queued. [`SyncEngine::sync`] replays the
//! queue in order; it runs on reconnect (after a short quiet period), on a
//! timer, or when called.
//!
//! Outcomes that no caller is waiting for are published as [`SyncEvent`]s.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tablesync_client::{connectivity, JsonFileStore, MockRemote, SyncConfig, SyncEngine};
//!
//! # async fn run() -> Result<(), tablesync_client::SyncError> {
//! let (reporter, watch) = connectivity(false);
//! let engine = SyncEngine::open(
//!     SyncConfig::default(),
//!     Arc::new(MockRemote::new()),
//!     Arc::new(JsonFileStore::new("state.json")),
//!     watch,
//! )
//! .await?;
//!
//! let table: tablesync_client::TableKey = "base1:tbl1".parse()?;
//! let fields = serde_json::json!({"Name": "A"}).as_object().cloned().unwrap_or_default();
//! let record = engine.create_record(&table, fields).await?;
//! assert!(record.is_placeholder());
//!
//! // Back online: the queued create is replayed after the debounce window.
//! reporter.set_online(true);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod http;
pub mod persist;
pub mod remote;
mod triggers;

pub use config::{ConfigError, RemoteConfig, SyncConfig};
pub use connectivity::{connectivity, ConnectivityReporter, ConnectivityWatch};
pub use coordinator::{RemoteChange, SyncEngine};
pub use error::{Result, SyncError};
pub use events::{SyncEvent, SyncSummary};
pub use http::HttpRemote;
pub use persist::{DurableStore, JsonFileStore, MemoryStore, StoreError};
pub use remote::{MockRemote, RemoteCall, RemoteClient, RemoteError, RemoteResult};

pub use tablesync_engine::{Fields, Record, RecordId, SyncOperation, TableKey};
