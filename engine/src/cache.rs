//! Record cache - the local mirror of remote tables.
//!
//! Records are kept per table in insertion order. Ids are unique within a
//! table; `put` replaces in place so a record keeps its position when it is
//! updated.

use crate::{Record, TableKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-table keyed mapping of record id to record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordCache {
    tables: BTreeMap<TableKey, Vec<Record>>,
}

impl RecordCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// All cached records of a table. Unknown tables are empty.
    pub fn get(&self, table: &TableKey) -> &[Record] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A single cached record.
    pub fn get_record(&self, table: &TableKey, id: &str) -> Option<&Record> {
        self.tables.get(table)?.iter().find(|r| r.id == id)
    }

    /// A single cached record, mutably.
    pub fn get_record_mut(&mut self, table: &TableKey, id: &str) -> Option<&mut Record> {
        self.tables.get_mut(table)?.iter_mut().find(|r| r.id == id)
    }

    /// Insert a record, or replace the record with the same id in place.
    pub fn put(&mut self, table: &TableKey, record: Record) {
        let records = self.tables.entry(table.clone()).or_default();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    /// Remove a record, returning it if it was cached.
    pub fn remove(&mut self, table: &TableKey, id: &str) -> Option<Record> {
        let records = self.tables.get_mut(table)?;
        let position = records.iter().position(|r| r.id == id)?;
        Some(records.remove(position))
    }

    /// Replace the record cached under `old_id` with `record`, which may
    /// carry a different id. The replacement takes the old position; any
    /// other record already cached under the new id is dropped.
    ///
    /// Returns false (and inserts nothing) if `old_id` was not cached.
    pub fn rename(&mut self, table: &TableKey, old_id: &str, record: Record) -> bool {
        let Some(records) = self.tables.get_mut(table) else {
            return false;
        };
        let Some(position) = records.iter().position(|r| r.id == old_id) else {
            return false;
        };

        let new_id = record.id.clone();
        records[position] = record;

        if new_id != old_id {
            let mut index = 0;
            records.retain(|r| {
                let keep = index == position || r.id != new_id;
                index += 1;
                keep
            });
        }
        true
    }

    /// Replace a table's records wholesale.
    pub fn replace_table(&mut self, table: &TableKey, records: Vec<Record>) {
        self.tables.insert(table.clone(), records);
    }

    /// Keys of all tables that have been cached.
    pub fn tables(&self) -> impl Iterator<Item = &TableKey> {
        self.tables.keys()
    }

    /// Number of cached tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Number of cached records across all tables.
    pub fn record_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    /// Whether no records are cached.
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
