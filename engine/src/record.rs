//! Record types for cached table rows.

use crate::{Fields, RecordId, Timestamp, Version};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of locally generated record ids.
pub const PLACEHOLDER_PREFIX: &str = "local_";

/// Generate a fresh placeholder id for a record created before the server
/// has issued one.
pub fn placeholder_id() -> RecordId {
    format!("{}{}", PLACEHOLDER_PREFIX, Uuid::new_v4().simple())
}

/// Whether an id was generated locally rather than issued by the server.
pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

/// A row of a table as mirrored in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Server-issued id, or a placeholder until the create is confirmed
    pub id: RecordId,
    /// Field values keyed by field name
    #[serde(default)]
    pub fields: Fields,
    /// When the record was created
    pub created_time: Timestamp,
    /// When the record was last modified locally or remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_time: Option<Timestamp>,
    /// Local revision counter, bumped on every local mutation.
    /// Never sent to the server; server payloads omit it.
    #[serde(default)]
    pub version: Version,
}

impl Record {
    /// Create a new locally-originated record at version 1.
    pub fn new(id: impl Into<RecordId>, fields: Fields, timestamp: Timestamp) -> Self {
        Self {
            id: id.into(),
            fields,
            created_time: timestamp,
            updated_time: None,
            version: 1,
        }
    }

    /// Whether this record still carries a locally generated id.
    pub fn is_placeholder(&self) -> bool {
        is_placeholder_id(&self.id)
    }

    /// Replace the field set, keeping `created_time` and bumping `version`.
    pub fn replace_fields(&mut self, fields: Fields, timestamp: Timestamp) {
        self.fields = fields;
        self.version += 1;
        self.updated_time = Some(timestamp);
    }
}
