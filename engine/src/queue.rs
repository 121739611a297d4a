//! Pending operation queue.
//!
//! An ordered log of mutations the backend has not confirmed yet. Enqueue
//! order is replay order. The queue never coalesces: three updates of one
//! record are three entries, replayed in turn. A failed entry keeps its
//! position; it is removed exactly once, on confirmation or abandonment.

use crate::{
    error::Result, Error, OperationId, OperationStatus, RecordId, SyncOperation, TableKey,
};
use serde::{Deserialize, Serialize};

/// What happened to an operation after a failed replay attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// Still queued; will be attempted again on a later pass
    Retry { retry_count: u32 },
    /// Retry ceiling reached; the operation has been removed
    Abandoned(SyncOperation),
}

/// FIFO log of unconfirmed operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationQueue {
    operations: Vec<SyncOperation>,
}

impl OperationQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
        }
    }

    /// Append an operation at the tail.
    pub fn enqueue(&mut self, op: SyncOperation) {
        self.operations.push(op);
    }

    /// Remove a confirmed operation.
    pub fn dequeue_confirmed(&mut self, id: OperationId) -> Option<SyncOperation> {
        let position = self.position(id)?;
        Some(self.operations.remove(position))
    }

    /// Read-only view in replay order.
    pub fn list(&self) -> &[SyncOperation] {
        &self.operations
    }

    /// Ids in replay order, for snapshotting a sync pass.
    pub fn ids(&self) -> Vec<OperationId> {
        self.operations.iter().map(|op| op.id).collect()
    }

    /// Look up an operation.
    pub fn get(&self, id: OperationId) -> Option<&SyncOperation> {
        self.operations.iter().find(|op| op.id == id)
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Mark an operation as in flight and return a copy to replay.
    pub fn mark_syncing(&mut self, id: OperationId) -> Result<SyncOperation> {
        let op = self.get_mut(id)?;
        op.status = OperationStatus::Syncing;
        Ok(op.clone())
    }

    /// Put an in-flight operation back to pending without counting an attempt.
    pub fn release(&mut self, id: OperationId) -> Result<()> {
        self.get_mut(id)?.status = OperationStatus::Pending;
        Ok(())
    }

    /// Count a failed attempt. Below `max_attempts` the operation goes back
    /// to pending in its original position; at the ceiling it is removed.
    pub fn record_failure(
        &mut self,
        id: OperationId,
        error: impl Into<String>,
        max_attempts: u32,
    ) -> Result<FailureOutcome> {
        let position = self.position(id).ok_or(Error::OperationNotFound(id))?;
        let op = &mut self.operations[position];
        op.retry_count += 1;
        op.last_error = Some(error.into());

        if op.retry_count < max_attempts {
            op.status = OperationStatus::Pending;
            return Ok(FailureOutcome::Retry {
                retry_count: op.retry_count,
            });
        }

        let mut abandoned = self.operations.remove(position);
        abandoned.status = OperationStatus::Failed;
        Ok(FailureOutcome::Abandoned(abandoned))
    }

    /// Whether any queued operation targets the record.
    pub fn has_pending_for(&self, table: &TableKey, record_id: &str) -> bool {
        self.operations.iter().any(|op| op.targets(table, record_id))
    }

    /// Point every queued operation for `old_id` at `new_id`.
    /// Returns how many operations were rewritten.
    pub fn rewrite_record_id(&mut self, table: &TableKey, old_id: &str, new_id: &RecordId) -> usize {
        let mut rewritten = 0;
        for op in self
            .operations
            .iter_mut()
            .filter(|op| op.targets(table, old_id))
        {
            op.record_id = Some(new_id.clone());
            rewritten += 1;
        }
        rewritten
    }

    /// Operations left in flight by an interrupted pass go back to pending.
    pub fn reset_in_flight(&mut self) -> usize {
        let mut reset = 0;
        for op in &mut self.operations {
            if op.status == OperationStatus::Syncing {
                op.status = OperationStatus::Pending;
                reset += 1;
            }
        }
        reset
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.operations.clear();
    }

    fn position(&self, id: OperationId) -> Option<usize> {
        self.operations.iter().position(|op| op.id == id)
    }

    fn get_mut(&mut self, id: OperationId) -> Result<&mut SyncOperation> {
        self.operations
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(Error::OperationNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Fields, Timestamp};
    use chrono::{TimeZone, Utc};

    fn table() -> TableKey {
        "base1:tbl1".parse().unwrap()
    }

    fn ts(secs: i64) -> Timestamp {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn update(record_id: &str) -> SyncOperation {
        SyncOperation::update(
            OperationId::new_v4(),
            table(),
            record_id,
            Fields::new(),
            ts(1000),
        )
    }

    #[test]
    fn fifo_order() {
        let mut queue = OperationQueue::new();
        let ops = vec![update("rec1"), update("rec2"), update("rec1")];
        for op in &ops {
            queue.enqueue(op.clone());
        }

        let ids: Vec<_> = ops.iter().map(|op| op.id).collect();
        assert_eq!(queue.ids(), ids);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn no_coalescing() {
        let mut queue = OperationQueue::new();
        queue.enqueue(update("rec1"));
        queue.enqueue(update("rec1"));
        queue.enqueue(update("rec1"));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn dequeue_confirmed_removes_once() {
        let mut queue = OperationQueue::new();
        let op = update("rec1");
        let id = op.id;
        queue.enqueue(op);

        assert!(queue.dequeue_confirmed(id).is_some());
        assert!(queue.dequeue_confirmed(id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn failure_retries_in_place_then_abandons() {
        let mut queue = OperationQueue::new();
        let first = update("rec1");
        let second = update("rec2");
        let id = first.id;
        queue.enqueue(first);
        queue.enqueue(second.clone());

        queue.mark_syncing(id).unwrap();
        assert_eq!(
            queue.record_failure(id, "timeout", 3).unwrap(),
            FailureOutcome::Retry { retry_count: 1 }
        );
        assert_eq!(queue.ids()[0], id);
        assert_eq!(queue.get(id).unwrap().status, OperationStatus::Pending);

        assert_eq!(
            queue.record_failure(id, "timeout", 3).unwrap(),
            FailureOutcome::Retry { retry_count: 2 }
        );

        match queue.record_failure(id, "still down", 3).unwrap() {
            FailureOutcome::Abandoned(op) => {
                assert_eq!(op.retry_count, 3);
                assert_eq!(op.status, OperationStatus::Failed);
                assert_eq!(op.last_error.as_deref(), Some("still down"));
            }
            other => panic!("expected abandonment, got {other:?}"),
        }
        assert_eq!(queue.ids(), vec![second.id]);
    }

    #[test]
    fn unknown_operation() {
        let mut queue = OperationQueue::new();
        let id = OperationId::new_v4();
        assert!(matches!(
            queue.record_failure(id, "x", 3),
            Err(Error::OperationNotFound(_))
        ));
        assert!(matches!(
            queue.mark_syncing(id),
            Err(Error::OperationNotFound(_))
        ));
    }

    #[test]
    fn release_does_not_count_attempt() {
        let mut queue = OperationQueue::new();
        let op = update("rec1");
        let id = op.id;
        queue.enqueue(op);

        queue.mark_syncing(id).unwrap();
        queue.release(id).unwrap();

        let op = queue.get(id).unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.retry_count, 0);
    }

    #[test]
    fn rewrite_record_id_only_touches_target() {
        let mut queue = OperationQueue::new();
        queue.enqueue(update("local_1"));
        queue.enqueue(update("rec2"));
        queue.enqueue(update("local_1"));

        let rewritten = queue.rewrite_record_id(&table(), "local_1", &"recServer".to_string());
        assert_eq!(rewritten, 2);
        assert!(!queue.has_pending_for(&table(), "local_1"));
        assert!(queue.has_pending_for(&table(), "recServer"));
        assert!(queue.has_pending_for(&table(), "rec2"));
    }

    #[test]
    fn reset_in_flight() {
        let mut queue = OperationQueue::new();
        let op = update("rec1");
        let id = op.id;
        queue.enqueue(op);
        queue.enqueue(update("rec2"));
        queue.mark_syncing(id).unwrap();

        assert_eq!(queue.reset_in_flight(), 1);
        assert!(queue
            .list()
            .iter()
            .all(|op| op.status == OperationStatus::Pending));
    }
}
