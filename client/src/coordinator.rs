//! Sync coordinator.
//!
//! [`SyncEngine`] owns the engine state and decides, per mutation, whether a
//! change is confirmed directly against the backend or staged optimistically
//! and queued. `sync()` drains the queue in enqueue order.
//!
//! State is guarded by a synchronous mutex that is never held across an
//! await. Every remote call and every save is a suspension point; between
//! them cache and queue change together.

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityWatch;
use crate::error::{Result, SyncError};
use crate::events::{EventBus, SyncEvent, SyncSummary};
use crate::persist::DurableStore;
use crate::remote::{RemoteClient, RemoteError, RemoteResult};
use crate::triggers;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tablesync_engine::{
    record::placeholder_id, EngineState, FailureOutcome, Fields, OperationId, OperationKind,
    Record, RecordId, StateMetadata, SyncOperation, TableKey, Timestamp,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A change delivered by a push transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteChange {
    Created(TableKey, Record),
    Updated(TableKey, Record),
    Deleted(TableKey, RecordId),
}

/// Server answer to a replayed operation.
enum Confirmation {
    Created(Record),
    Updated(Record),
    Deleted,
}

/// Offline-first client for remote tables.
pub struct SyncEngine {
    config: SyncConfig,
    remote: Arc<dyn RemoteClient>,
    store: Arc<dyn DurableStore>,
    connectivity: ConnectivityWatch,
    state: Mutex<EngineState>,
    syncing: AtomicBool,
    persist_lock: tokio::sync::Mutex<()>,
    pub(crate) events: EventBus,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Restores the saved state and starts the background triggers.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn open(
        config: SyncConfig,
        remote: Arc<dyn RemoteClient>,
        store: Arc<dyn DurableStore>,
        connectivity: ConnectivityWatch,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let mut state = store.load().await?.unwrap_or_default();
        let reset = state.pending_operations.reset_in_flight();

        let engine = Arc::new(Self {
            config,
            remote,
            store,
            connectivity,
            state: Mutex::new(state),
            syncing: AtomicBool::new(false),
            persist_lock: tokio::sync::Mutex::new(()),
            events: EventBus::new(),
            tasks: Mutex::new(Vec::new()),
        });

        if reset > 0 {
            tracing::warn!(reset, "Operations interrupted mid-sync returned to pending");
            engine.persist().await;
        }

        *engine.tasks.lock() = triggers::spawn(&engine);

        tracing::info!(
            pending = engine.pending_operations_count(),
            online = engine.is_online(),
            "Sync engine opened"
        );

        Ok(engine)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Creates a record.
    ///
    /// Online, the backend is asked first and its record is cached. If that
    /// fails, or when offline, the record is cached under a placeholder id
    /// and the create is queued.
    pub async fn create_record(&self, table: &TableKey, fields: Fields) -> Result<Record> {
        if self.is_online() {
            match self.call(self.remote.create(table, &fields)).await {
                Ok(server_record) => {
                    let record = self.state.lock().apply_direct(table, server_record);
                    self.commit(table).await;
                    tracing::debug!(table = %table, record_id = %record.id, "Record created");
                    return Ok(record);
                }
                Err(err) => self.fallback(table, "create", err)?,
            }
        } else if !self.config.optimistic_updates {
            return Err(SyncError::Offline);
        }

        let record = self.state.lock().stage_create(
            table,
            fields,
            placeholder_id(),
            OperationId::new_v4(),
            Utc::now(),
        );
        self.commit(table).await;
        tracing::debug!(table = %table, record_id = %record.id, "Create queued");
        Ok(record)
    }

    /// Replaces the field set of a record.
    pub async fn update_record(
        &self,
        table: &TableKey,
        record_id: &str,
        fields: Fields,
    ) -> Result<Record> {
        let record_id = self.resolve_id(record_id);
        let record_id = record_id.as_str();
        if self.can_call_directly(table, record_id)? {
            match self
                .call(self.remote.update(table, record_id, &fields))
                .await
            {
                Ok(server_record) => {
                    let record = self.state.lock().apply_direct(table, server_record);
                    self.commit(table).await;
                    tracing::debug!(table = %table, record_id, "Record updated");
                    return Ok(record);
                }
                Err(err) => self.fallback(table, "update", err)?,
            }
        }

        let record = self.state.lock().stage_update(
            table,
            record_id,
            fields,
            OperationId::new_v4(),
            Utc::now(),
        );
        self.commit(table).await;
        tracing::debug!(table = %table, record_id, version = record.version, "Update queued");
        Ok(record)
    }

    /// Deletes a record.
    pub async fn delete_record(&self, table: &TableKey, record_id: &str) -> Result<()> {
        let record_id = self.resolve_id(record_id);
        let record_id = record_id.as_str();
        if self.can_call_directly(table, record_id)? {
            match self.call(self.remote.delete(table, record_id)).await {
                Ok(()) => {
                    self.state.lock().apply_remote_delete(table, record_id);
                    self.commit(table).await;
                    tracing::debug!(table = %table, record_id, "Record deleted");
                    return Ok(());
                }
                Err(err) => self.fallback(table, "delete", err)?,
            }
        }

        self.state
            .lock()
            .stage_delete(table, record_id, OperationId::new_v4(), Utc::now());
        self.commit(table).await;
        tracing::debug!(table = %table, record_id, "Delete queued");
        Ok(())
    }

    /// Applies a change pushed by the backend through the same cache path
    /// as local mutations.
    pub async fn apply_remote_change(&self, change: RemoteChange) {
        let table = match change {
            RemoteChange::Created(table, record) | RemoteChange::Updated(table, record) => {
                self.state.lock().apply_confirmed(&table, record);
                table
            }
            RemoteChange::Deleted(table, record_id) => {
                self.state.lock().apply_remote_delete(&table, &record_id);
                table
            }
        };
        self.commit(&table).await;
    }

    /// Replaces a table with the backend's listing. Records with queued
    /// operations keep their local form.
    pub async fn refresh_table(&self, table: &TableKey) -> Result<Vec<Record>> {
        if !self.is_online() {
            return Err(SyncError::Offline);
        }

        let listed = self.call(self.remote.list(table)).await?;
        let records = self.state.lock().replace_table(table, listed).to_vec();
        self.persist().await;
        self.events.emit(SyncEvent::CacheUpdated {
            table: table.clone(),
            records: records.clone(),
        });

        tracing::debug!(table = %table, count = records.len(), "Table refreshed");
        Ok(records)
    }

    /// Wipes cache and queue, for logout or reset.
    pub async fn clear_cache(&self) {
        self.state.lock().clear();
        self.persist().await;
        self.events.emit(SyncEvent::CacheCleared);
        tracing::info!("Cache cleared");
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    /// Replays queued operations in enqueue order.
    ///
    /// Returns `None` without side effects when offline or when another
    /// pass is running. Failures are reported through events, never to
    /// the caller.
    pub async fn sync(&self) -> Option<SyncSummary> {
        if !self.is_online() {
            tracing::trace!("Sync skipped: offline");
            return None;
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("Sync skipped: already running");
            return None;
        }
        let _guard = SyncingGuard(&self.syncing);

        self.events.emit(SyncEvent::SyncStart);

        let ids = self.state.lock().pending_operations.ids();
        if ids.is_empty() {
            self.events.emit(SyncEvent::SyncComplete(SyncSummary::default()));
            return Some(SyncSummary::default());
        }

        tracing::info!(pending = ids.len(), "Sync pass started");

        let mut summary = SyncSummary::default();
        let mut failed_records: HashSet<(TableKey, RecordId)> = HashSet::new();
        let mut touched: BTreeSet<TableKey> = BTreeSet::new();

        for id in ids {
            // Remaining operations wait for the next pass without losing a retry.
            if !self.is_online() {
                tracing::info!("Sync pass stopped: offline");
                break;
            }

            let op = {
                let mut state = self.state.lock();
                let deferred = match state.pending_operations.get(id) {
                    // Gone: cleared while the pass was running.
                    None => continue,
                    Some(op) => failed_records.contains(&record_key(op)),
                };
                if deferred {
                    summary.deferred += 1;
                    continue;
                }
                match state.pending_operations.mark_syncing(id) {
                    Ok(op) => op,
                    Err(_) => continue,
                }
            };

            summary.attempted += 1;
            tracing::debug!(
                op_id = %op.id,
                kind = %op.kind,
                table = %op.table_key,
                retry_count = op.retry_count,
                "Replaying operation"
            );

            match self.replay(&op).await {
                Ok(confirmation) => {
                    self.confirm(&op, confirmation);
                    summary.confirmed += 1;
                    touched.insert(op.table_key.clone());
                }
                Err(RemoteError::Unauthorized(message)) => {
                    if let Err(e) = self.state.lock().pending_operations.release(op.id) {
                        tracing::warn!(op_id = %op.id, error = %e, "Released operation no longer queued");
                    }
                    tracing::warn!(op_id = %op.id, error = %message, "Sync stopped: unauthorized");
                    self.events.emit(SyncEvent::SyncError {
                        error: RemoteError::Unauthorized(message).to_string(),
                    });
                    break;
                }
                Err(err) => {
                    failed_records.insert(record_key(&op));
                    self.record_failure(&op, err, &mut summary);
                }
            }

            self.persist().await;
        }

        self.state.lock().mark_synced(Utc::now());
        self.persist().await;

        for table in touched {
            self.emit_cache_updated(&table);
        }

        tracing::info!(
            attempted = summary.attempted,
            confirmed = summary.confirmed,
            retried = summary.retried,
            abandoned = summary.abandoned,
            deferred = summary.deferred,
            "Sync pass complete"
        );
        self.events.emit(SyncEvent::SyncComplete(summary));

        Some(summary)
    }

    async fn replay(&self, op: &SyncOperation) -> RemoteResult<Confirmation> {
        let table = &op.table_key;
        let record_id = op.record_id.as_deref().unwrap_or_default();

        match op.kind {
            OperationKind::Create => self
                .call(self.remote.create(table, &op.payload))
                .await
                .map(Confirmation::Created),
            OperationKind::Update => self
                .call(self.remote.update(table, record_id, &op.payload))
                .await
                .map(Confirmation::Updated),
            OperationKind::Delete => self
                .call(self.remote.delete(table, record_id))
                .await
                .map(|()| Confirmation::Deleted),
        }
    }

    fn confirm(&self, op: &SyncOperation, confirmation: Confirmation) {
        let result = {
            let mut state = self.state.lock();
            match confirmation {
                Confirmation::Created(record) => state.confirm_create(op.id, record).map(Some),
                Confirmation::Updated(record) => state.confirm(op.id, Some(record)).map(|_| None),
                Confirmation::Deleted => state.confirm(op.id, None).map(|_| None),
            }
        };

        match result {
            Ok(Some(mapping)) => {
                tracing::debug!(
                    table = %mapping.table,
                    placeholder_id = %mapping.placeholder_id,
                    server_id = %mapping.server_id,
                    rewritten = mapping.rewritten_operations,
                    "Placeholder id reconciled"
                );
                self.events.emit(SyncEvent::RecordIdReconciled {
                    table: mapping.table,
                    placeholder_id: mapping.placeholder_id,
                    server_id: mapping.server_id,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(op_id = %op.id, error = %e, "Confirmed operation no longer queued"),
        }
    }

    fn record_failure(&self, op: &SyncOperation, err: RemoteError, summary: &mut SyncSummary) {
        let error = err.to_string();
        let outcome = self.state.lock().record_failure(
            op.id,
            error.clone(),
            self.config.max_retry_attempts,
        );

        match outcome {
            Ok(FailureOutcome::Retry { retry_count }) => {
                summary.retried += 1;
                tracing::debug!(op_id = %op.id, retry_count, error = %error, "Operation will be retried");
            }
            Ok(FailureOutcome::Abandoned(operation)) => {
                summary.abandoned += 1;
                tracing::warn!(op_id = %op.id, error = %error, "Operation abandoned after retries");
                if matches!(err, RemoteError::ServerRejected { .. }) {
                    self.events.emit(SyncEvent::SyncError {
                        error: error.clone(),
                    });
                }
                self.events
                    .emit(SyncEvent::OperationFailed { operation, error });
            }
            Err(e) => tracing::warn!(op_id = %op.id, error = %e, "Failed operation no longer queued"),
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Number of queued operations.
    pub fn pending_operations_count(&self) -> usize {
        self.state.lock().pending_count()
    }

    /// Queued operations in replay order.
    pub fn pending_operations(&self) -> Vec<SyncOperation> {
        self.state.lock().pending_operations().to_vec()
    }

    /// Cached records of a table.
    pub fn records(&self, table: &TableKey) -> Vec<Record> {
        self.state.lock().records(table).to_vec()
    }

    /// A single cached record.
    pub fn record(&self, table: &TableKey, record_id: &str) -> Option<Record> {
        self.state.lock().record(table, record_id).cloned()
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// End of the last sync pass that replayed anything.
    pub fn last_sync_timestamp(&self) -> Option<Timestamp> {
        self.state.lock().last_sync_timestamp
    }

    pub fn metadata(&self) -> StateMetadata {
        self.state.lock().metadata()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Receives every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub(crate) fn connectivity(&self) -> ConnectivityWatch {
        self.connectivity.clone()
    }

    /// Stops the background triggers. A running sync pass is not interrupted.
    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if !tasks.is_empty() {
            tracing::debug!(tasks = tasks.len(), "Stopping sync triggers");
        }
        for task in tasks {
            task.abort();
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Bounds a remote call by the configured timeout.
    async fn call<T>(&self, request: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        match tokio::time::timeout(self.config.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    /// The current id of a record, following a confirmed create from its
    /// placeholder to the server id.
    fn resolve_id(&self, record_id: &str) -> RecordId {
        self.state.lock().resolve_id(record_id).to_string()
    }

    /// Whether an update or delete may go to the backend directly.
    ///
    /// A record with queued operations always takes the optimistic path, so
    /// a direct call never overtakes older edits of the same record.
    fn can_call_directly(&self, table: &TableKey, record_id: &str) -> Result<bool> {
        if !self.is_online() {
            return if self.config.optimistic_updates {
                Ok(false)
            } else {
                Err(SyncError::Offline)
            };
        }
        Ok(!self.state.lock().has_pending_for(table, record_id))
    }

    /// Decides what a failed direct call turns into. `Ok` means stage the
    /// mutation optimistically.
    fn fallback(&self, table: &TableKey, action: &str, err: RemoteError) -> Result<()> {
        if !err.is_retryable() || !self.config.optimistic_updates {
            tracing::warn!(table = %table, action, error = %err, "Direct call failed");
            return Err(err.into());
        }
        tracing::debug!(table = %table, action, error = %err, "Direct call failed, queueing");
        Ok(())
    }

    /// Persists and announces a change to one table.
    async fn commit(&self, table: &TableKey) {
        self.persist().await;
        self.emit_cache_updated(table);
    }

    fn emit_cache_updated(&self, table: &TableKey) {
        let records = self.records(table);
        self.events.emit(SyncEvent::CacheUpdated {
            table: table.clone(),
            records,
        });
    }

    /// Saves the current state. Saves run one at a time and each writes the
    /// state as of taking the lock, so an older snapshot never lands last.
    async fn persist(&self) {
        let _lock = self.persist_lock.lock().await;
        let snapshot = self.state.lock().clone();
        if let Err(e) = self.store.save(&snapshot).await {
            tracing::warn!(error = %e, "Failed to persist engine state");
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("online", &self.is_online())
            .field("syncing", &self.is_syncing())
            .field("pending", &self.pending_operations_count())
            .finish_non_exhaustive()
    }
}

fn record_key(op: &SyncOperation) -> (TableKey, RecordId) {
    (op.table_key.clone(), op.record_id.clone().unwrap_or_default())
}

/// Clears the single-flight flag even if the pass is cancelled.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
