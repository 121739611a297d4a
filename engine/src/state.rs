//! Engine state - the single unit of durability.
//!
//! [`EngineState`] owns the record cache, the pending operation queue and the
//! last sync time. Every mutation that must survive a restart goes through
//! one of its methods, after which the caller persists the whole value.
//! Cache and queue are always changed together inside one call, so a saved
//! state never holds a queued operation without its cache effect.

use crate::{
    error::Result, queue::FailureOutcome, Error, Fields, OperationId, OperationKind,
    OperationQueue, Record, RecordCache, RecordId, SyncOperation, TableKey, Timestamp,
    SNAPSHOT_FORMAT_VERSION,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder-to-server id mapping produced by a confirmed create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdReconciliation {
    pub table: TableKey,
    pub placeholder_id: RecordId,
    pub server_id: RecordId,
    /// Queued operations that were re-pointed at the server id
    pub rewritten_operations: usize,
}

/// Cached tables, pending operations and last sync time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    /// Serialization format version
    pub format_version: u32,
    /// Cached records by table
    pub tables: RecordCache,
    /// Operations waiting for confirmation, in replay order
    pub pending_operations: OperationQueue,
    /// End of the last completed sync pass
    #[serde(default)]
    pub last_sync_timestamp: Option<Timestamp>,
    /// Server ids of confirmed creates, by the placeholder id handed out
    /// before confirmation
    #[serde(default)]
    pub id_aliases: BTreeMap<RecordId, RecordId>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            tables: RecordCache::new(),
            pending_operations: OperationQueue::new(),
            last_sync_timestamp: None,
            id_aliases: BTreeMap::new(),
        }
    }

    /// The current id of a record. A placeholder whose create was confirmed
    /// resolves to the server id; any other id is returned as is.
    pub fn resolve_id<'a>(&'a self, id: &'a str) -> &'a str {
        self.id_aliases.get(id).map_or(id, String::as_str)
    }

    /// Cached records of a table.
    pub fn records(&self, table: &TableKey) -> &[Record] {
        self.tables.get(table)
    }

    /// A single cached record.
    pub fn record(&self, table: &TableKey, id: &str) -> Option<&Record> {
        self.tables.get_record(table, self.resolve_id(id))
    }

    /// Queued operations in replay order.
    pub fn pending_operations(&self) -> &[SyncOperation] {
        self.pending_operations.list()
    }

    /// Number of queued operations.
    pub fn pending_count(&self) -> usize {
        self.pending_operations.len()
    }

    /// Whether the record has unconfirmed operations.
    pub fn has_pending_for(&self, table: &TableKey, record_id: &str) -> bool {
        self.pending_operations
            .has_pending_for(table, self.resolve_id(record_id))
    }

    // ------------------------------------------------------------------
    // Optimistic mutations
    // ------------------------------------------------------------------

    /// Cache a new record under a placeholder id and queue its create.
    pub fn stage_create(
        &mut self,
        table: &TableKey,
        fields: Fields,
        placeholder_id: impl Into<RecordId>,
        op_id: OperationId,
        now: Timestamp,
    ) -> Record {
        let record = Record::new(placeholder_id, fields, now);

        self.tables.put(table, record.clone());
        self.pending_operations.enqueue(SyncOperation::create(
            op_id,
            table.clone(),
            record.id.clone(),
            record.fields.clone(),
            now,
        ));

        record
    }

    /// Replace a record's field set locally and queue the update.
    ///
    /// A record that is not cached is materialised at version 1 so the
    /// queued update always has a cache effect.
    pub fn stage_update(
        &mut self,
        table: &TableKey,
        id: &str,
        fields: Fields,
        op_id: OperationId,
        now: Timestamp,
    ) -> Record {
        let id = self.resolve_id(id).to_string();
        let record = match self.tables.get_record_mut(table, &id) {
            Some(existing) => {
                existing.replace_fields(fields.clone(), now);
                existing.clone()
            }
            None => {
                let mut record = Record::new(id.clone(), fields.clone(), now);
                record.updated_time = Some(now);
                self.tables.put(table, record.clone());
                record
            }
        };

        self.pending_operations.enqueue(SyncOperation::update(
            op_id,
            table.clone(),
            id,
            fields,
            now,
        ));

        record
    }

    /// Remove a record locally and queue the delete.
    pub fn stage_delete(
        &mut self,
        table: &TableKey,
        id: &str,
        op_id: OperationId,
        now: Timestamp,
    ) -> Option<Record> {
        let id = self.resolve_id(id).to_string();
        let removed = self.tables.remove(table, &id);
        self.pending_operations
            .enqueue(SyncOperation::delete(op_id, table.clone(), id, now));
        removed
    }

    // ------------------------------------------------------------------
    // Server-confirmed changes
    // ------------------------------------------------------------------

    /// Cache a record as the server returned it. The local revision counter
    /// of an already cached record carries over.
    pub fn apply_confirmed(&mut self, table: &TableKey, mut record: Record) -> Record {
        if let Some(existing) = self.tables.get_record(table, &record.id) {
            record.version = existing.version;
        }
        self.tables.put(table, record.clone());
        record
    }

    /// Cache the server's answer to a local mutation that was confirmed
    /// without queueing. Counts as a local revision.
    pub fn apply_direct(&mut self, table: &TableKey, mut record: Record) -> Record {
        record.version = self
            .tables
            .get_record(table, &record.id)
            .map_or(1, |existing| existing.version + 1);
        self.tables.put(table, record.clone());
        record
    }

    /// Drop a record the server reports as deleted.
    pub fn apply_remote_delete(&mut self, table: &TableKey, id: &str) -> Option<Record> {
        self.tables.remove(table, id)
    }

    /// Remove a confirmed create and move its record to the server id.
    ///
    /// Queued operations that still target the placeholder are re-pointed
    /// at the server id. While such operations remain, the cached record
    /// keeps its optimistic fields and only adopts the server id.
    pub fn confirm_create(
        &mut self,
        op_id: OperationId,
        server_record: Record,
    ) -> Result<IdReconciliation> {
        let op = self
            .pending_operations
            .get(op_id)
            .ok_or(Error::OperationNotFound(op_id))?;
        if op.kind != OperationKind::Create {
            return Err(Error::NotACreate(op_id));
        }

        let op = self
            .pending_operations
            .dequeue_confirmed(op_id)
            .ok_or(Error::OperationNotFound(op_id))?;
        let table = op.table_key;
        let placeholder_id = op.record_id.unwrap_or_default();
        let server_id = server_record.id.clone();

        let rewritten_operations =
            self.pending_operations
                .rewrite_record_id(&table, &placeholder_id, &server_id);

        let local = self.tables.get_record(&table, &placeholder_id).cloned();
        let cached = match local {
            Some(local) if rewritten_operations > 0 => Record {
                id: server_id.clone(),
                created_time: server_record.created_time,
                ..local
            },
            Some(local) => Record {
                version: local.version,
                ..server_record
            },
            None => server_record,
        };

        // The placeholder may already be gone (deleted locally while the
        // create was in flight). Then only queued ops learn the new id.
        if self.tables.get_record(&table, &placeholder_id).is_some() {
            self.tables.rename(&table, &placeholder_id, cached);
        }
        self.id_aliases
            .insert(placeholder_id.clone(), server_id.clone());

        Ok(IdReconciliation {
            table,
            placeholder_id,
            server_id,
            rewritten_operations,
        })
    }

    /// Remove a confirmed update or delete.
    ///
    /// For updates the server's canonical record replaces the cached one,
    /// unless later operations on the same record are still queued; their
    /// optimistic state wins until they are confirmed too.
    pub fn confirm(
        &mut self,
        op_id: OperationId,
        server_record: Option<Record>,
    ) -> Result<SyncOperation> {
        let op = self
            .pending_operations
            .dequeue_confirmed(op_id)
            .ok_or(Error::OperationNotFound(op_id))?;

        if let (OperationKind::Update, Some(record)) = (op.kind, server_record) {
            if !self.has_pending_for(&op.table_key, &record.id) {
                self.apply_confirmed(&op.table_key, record);
            }
        }

        Ok(op)
    }

    /// Count a failed replay attempt. The cache is left as it is, also when
    /// the operation is abandoned.
    pub fn record_failure(
        &mut self,
        op_id: OperationId,
        error: impl Into<String>,
        max_attempts: u32,
    ) -> Result<FailureOutcome> {
        self.pending_operations
            .record_failure(op_id, error, max_attempts)
    }

    /// Replace a table with a full server listing.
    ///
    /// Records with queued operations keep their local form: a pending
    /// update stays visible, a pending delete stays deleted, and a
    /// placeholder the server does not know yet is kept.
    pub fn replace_table(&mut self, table: &TableKey, server_records: Vec<Record>) -> &[Record] {
        let mut merged = Vec::with_capacity(server_records.len());

        for record in server_records {
            if self.has_pending_for(table, &record.id) {
                if let Some(local) = self.tables.get_record(table, &record.id) {
                    merged.push(local.clone());
                }
                continue;
            }
            let version = self
                .tables
                .get_record(table, &record.id)
                .map(|existing| existing.version);
            merged.push(Record {
                version: version.unwrap_or(record.version),
                ..record
            });
        }

        for local in self.tables.get(table) {
            let listed = merged.iter().any(|r| r.id == local.id);
            if !listed && self.has_pending_for(table, &local.id) {
                merged.push(local.clone());
            }
        }

        self.tables.replace_table(table, merged);
        self.tables.get(table)
    }

    /// Record the end of a sync pass.
    pub fn mark_synced(&mut self, now: Timestamp) {
        self.last_sync_timestamp = Some(now);
    }

    /// Wipe cache, queue and sync time.
    pub fn clear(&mut self) {
        self.tables.clear();
        self.pending_operations.clear();
        self.last_sync_timestamp = None;
        self.id_aliases.clear();
    }
}
