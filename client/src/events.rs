//! Sync events.
//!
//! Observers subscribe to a broadcast channel of [`SyncEvent`]s. A slow
//! subscriber that falls behind loses the oldest events; the engine never
//! blocks on delivery.

use serde::Serialize;
use tablesync_engine::{Record, RecordId, SyncOperation, TableKey};
use tokio::sync::broadcast;

/// Capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Counts reported at the end of a sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// Operations sent to the backend
    pub attempted: usize,
    /// Operations confirmed and removed
    pub confirmed: usize,
    /// Operations that failed and stay queued
    pub retried: usize,
    /// Operations removed after reaching the retry ceiling
    pub abandoned: usize,
    /// Operations skipped because an earlier one for the same record failed
    pub deferred: usize,
}

/// Something observers may want to react to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// Connectivity was regained.
    Online,

    /// Connectivity was lost.
    Offline,

    /// The cached records of a table changed.
    #[serde(rename_all = "camelCase")]
    CacheUpdated { table: TableKey, records: Vec<Record> },

    /// A sync pass started.
    SyncStart,

    /// A sync pass finished.
    SyncComplete(SyncSummary),

    /// A sync pass hit an error.
    SyncError { error: String },

    /// An operation was abandoned after reaching the retry ceiling.
    OperationFailed {
        operation: SyncOperation,
        error: String,
    },

    /// Cache and queue were wiped.
    CacheCleared,

    /// A confirmed create replaced its placeholder id.
    #[serde(rename_all = "camelCase")]
    RecordIdReconciled {
        table: TableKey,
        placeholder_id: RecordId,
        server_id: RecordId,
    },
}

/// Sending half of the event channel.
#[derive(Debug, Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Sends to current subscribers. Having none is not an error.
    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}
