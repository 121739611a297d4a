//! # Tablesync Engine
//!
//! The deterministic core of an offline-first sync client for tabular records.
//!
//! This crate holds the state an offline-capable client keeps between
//! backend round trips: a local mirror of remote tables, and an ordered log
//! of mutations the backend has not confirmed yet. The async shell that talks
//! to the network lives in `tablesync-client`; this crate has no IO.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine knows nothing about files, network or timers
//! - **Deterministic**: every timestamp and id is passed in by the caller
//! - **One unit of durability**: [`EngineState`] is saved and restored whole
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is a row of a table addressed by [`TableKey`]. Its `id` is
//! either issued by the server or a local placeholder (see
//! [`record::placeholder_id`]) until the create is confirmed. `version` is
//! a local revision counter bumped on every local mutation.
//!
//! ### Pending operations
//!
//! A mutation that could not be confirmed immediately becomes a
//! [`SyncOperation`] in the [`OperationQueue`]. Enqueue order is replay
//! order; operations are never coalesced or reordered.
//!
//! ### Staging and confirmation
//!
//! [`EngineState`] applies optimistic mutations (`stage_*`) to cache and
//! queue together, and folds backend outcomes back in (`confirm*`,
//! `record_failure`).
//!
//! ## Quick Start
//!
//! ```rust
//! use tablesync_engine::{EngineState, OperationId, TableKey};
//! use chrono::Utc;
//! use serde_json::json;
//!
//! let table: TableKey = "base1:tbl1".parse().unwrap();
//! let mut state = EngineState::new();
//!
//! let fields = json!({"Name": "x"}).as_object().cloned().unwrap();
//! let record = state.stage_create(
//!     &table,
//!     fields,
//!     tablesync_engine::record::placeholder_id(),
//!     OperationId::new_v4(),
//!     Utc::now(),
//! );
//!
//! assert!(record.is_placeholder());
//! assert_eq!(state.records(&table).len(), 1);
//! assert_eq!(state.pending_count(), 1);
//!
//! let json = state.to_json().unwrap();
//! assert_eq!(EngineState::from_json(&json).unwrap(), state);
//! ```

pub mod cache;
pub mod error;
pub mod operation;
pub mod queue;
pub mod record;
pub mod snapshot;
pub mod state;
pub mod table;

// Re-export main types at crate root
pub use cache::RecordCache;
pub use error::Error;
pub use operation::{OperationId, OperationKind, OperationStatus, SyncOperation};
pub use queue::{FailureOutcome, OperationQueue};
pub use record::Record;
pub use snapshot::{StateMetadata, SNAPSHOT_FORMAT_VERSION};
pub use state::{EngineState, IdReconciliation};
pub use table::TableKey;

/// Type aliases for clarity
pub type RecordId = String;
pub type Value = serde_json::Value;
pub type Fields = serde_json::Map<String, serde_json::Value>;
pub type Version = u64;
pub type Timestamp = chrono::DateTime<chrono::Utc>;
