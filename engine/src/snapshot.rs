//! Serialized form of [`EngineState`].
//!
//! The whole state is written as one JSON document. Tables are held in a
//! BTreeMap, so the same state always serializes to the same bytes.

use crate::{error::Result, EngineState, Error, Timestamp};
use serde::{Deserialize, Serialize};

/// Version of the state format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

impl EngineState {
    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidState(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidState(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let state: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidState(e.to_string()))?;

        if state.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidState(format!(
                "unsupported format version: {} (max supported: {})",
                state.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(state)
    }

    /// Summary counts without the data.
    pub fn metadata(&self) -> StateMetadata {
        StateMetadata::from(self)
    }
}

/// Metadata about a state (without the full data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMetadata {
    /// Format version
    pub format_version: u32,
    /// Number of cached tables
    pub table_count: usize,
    /// Number of cached records across tables
    pub record_count: usize,
    /// Number of queued operations
    pub pending_count: usize,
    /// End of the last completed sync pass
    pub last_sync_timestamp: Option<Timestamp>,
}

impl From<&EngineState> for StateMetadata {
    fn from(state: &EngineState) -> Self {
        Self {
            format_version: state.format_version,
            table_count: state.tables.table_count(),
            record_count: state.tables.record_count(),
            pending_count: state.pending_operations.len(),
            last_sync_timestamp: state.last_sync_timestamp,
        }
    }
}
