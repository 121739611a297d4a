//! Queued sync operations.
//!
//! A mutation that could not be confirmed by the backend when it was made is
//! recorded as a [`SyncOperation`] and replayed later, in enqueue order.

use crate::{Fields, RecordId, TableKey, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generate a random operation id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for OperationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What an operation does to its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Replay status of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting for the next sync pass
    #[default]
    Pending,
    /// Currently being replayed against the backend
    Syncing,
    /// Gave up after exhausting retries (only seen on abandoned copies)
    Failed,
}

/// A mutation waiting for backend confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Operation ID
    pub id: OperationId,
    /// Create, update or delete
    #[serde(rename = "type")]
    pub kind: OperationKind,
    /// Target table
    pub table_key: TableKey,
    /// Target record. For creates this is the placeholder id.
    pub record_id: Option<RecordId>,
    /// Fields to send (empty for deletes)
    #[serde(default)]
    pub payload: Fields,
    /// When the operation was queued
    pub enqueued_at: Timestamp,
    /// Replay status
    #[serde(default)]
    pub status: OperationStatus,
    /// Failed replay attempts so far; never decreases
    #[serde(default)]
    pub retry_count: u32,
    /// Text of the most recent replay failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncOperation {
    fn new(
        id: OperationId,
        kind: OperationKind,
        table_key: TableKey,
        record_id: RecordId,
        payload: Fields,
        enqueued_at: Timestamp,
    ) -> Self {
        Self {
            id,
            kind,
            table_key,
            record_id: Some(record_id),
            payload,
            enqueued_at,
            status: OperationStatus::Pending,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Create operation for a record known locally by `placeholder_id`.
    pub fn create(
        id: OperationId,
        table_key: TableKey,
        placeholder_id: impl Into<RecordId>,
        payload: Fields,
        enqueued_at: Timestamp,
    ) -> Self {
        Self::new(
            id,
            OperationKind::Create,
            table_key,
            placeholder_id.into(),
            payload,
            enqueued_at,
        )
    }

    /// Update operation replacing the record's field set.
    pub fn update(
        id: OperationId,
        table_key: TableKey,
        record_id: impl Into<RecordId>,
        payload: Fields,
        enqueued_at: Timestamp,
    ) -> Self {
        Self::new(
            id,
            OperationKind::Update,
            table_key,
            record_id.into(),
            payload,
            enqueued_at,
        )
    }

    /// Delete operation.
    pub fn delete(
        id: OperationId,
        table_key: TableKey,
        record_id: impl Into<RecordId>,
        enqueued_at: Timestamp,
    ) -> Self {
        Self::new(
            id,
            OperationKind::Delete,
            table_key,
            record_id.into(),
            Fields::new(),
            enqueued_at,
        )
    }

    /// Whether this operation targets the given record.
    pub fn targets(&self, table_key: &TableKey, record_id: &str) -> bool {
        &self.table_key == table_key && self.record_id.as_deref() == Some(record_id)
    }
}
