//! Remote client abstraction.
//!
//! The coordinator talks to the authoritative backend only through
//! [`RemoteClient`], so the HTTP implementation can be swapped for a mock in
//! tests or for another transport in an application.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tablesync_engine::{Fields, Record, RecordId, TableKey};

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Typed failure of a remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The backend could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The call did not finish in time.
    #[error("request timed out")]
    Timeout,

    /// The backend answered with an error status.
    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// Credentials were refused.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl RemoteError {
    /// Creates a rejection error.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::ServerRejected {
            status,
            message: message.into(),
        }
    }

    /// Returns true if the call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RemoteError::Unauthorized(_))
    }
}

/// Create, update, delete and list records on the backend.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Creates a record and returns it with its server-issued id.
    async fn create(&self, table: &TableKey, fields: &Fields) -> RemoteResult<Record>;

    /// Replaces the fields of a record and returns the canonical record.
    async fn update(
        &self,
        table: &TableKey,
        record_id: &str,
        fields: &Fields,
    ) -> RemoteResult<Record>;

    /// Deletes a record.
    async fn delete(&self, table: &TableKey, record_id: &str) -> RemoteResult<()>;

    /// Lists all records of a table.
    async fn list(&self, table: &TableKey) -> RemoteResult<Vec<Record>>;
}

/// A call observed by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Create { table: TableKey, fields: Fields },
    Update { table: TableKey, record_id: RecordId, fields: Fields },
    Delete { table: TableKey, record_id: RecordId },
    List { table: TableKey },
}

#[derive(Debug, Default)]
struct MockState {
    records: HashMap<TableKey, Vec<Record>>,
    calls: Vec<RemoteCall>,
    scripted_failures: VecDeque<RemoteError>,
    failure: Option<RemoteError>,
    delay: Option<Duration>,
    next_id: u64,
}

/// An in-memory backend for testing.
///
/// Records live in a map; created records get ids `rec1`, `rec2`, ...
/// Failures can be scripted per call or made permanent.
#[derive(Debug, Default)]
pub struct MockRemote {
    state: Mutex<MockState>,
}

impl MockRemote {
    /// Creates an empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next call with `error`; queued failures are used in order.
    pub fn push_failure(&self, error: RemoteError) {
        self.state.lock().scripted_failures.push_back(error);
    }

    /// Fails every call with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<RemoteError>) {
        self.state.lock().failure = error;
    }

    /// Delays every call, to hold a sync pass open.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    /// Seeds a record on the backend.
    pub fn insert(&self, table: &TableKey, record: Record) {
        self.state
            .lock()
            .records
            .entry(table.clone())
            .or_default()
            .push(record);
    }

    /// Records currently held by the backend for a table.
    pub fn records(&self, table: &TableKey) -> Vec<Record> {
        self.state
            .lock()
            .records
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    async fn begin(&self, call: RemoteCall) -> RemoteResult<()> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(call);
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(error) = state.scripted_failures.pop_front() {
            return Err(error);
        }
        match &state.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn create(&self, table: &TableKey, fields: &Fields) -> RemoteResult<Record> {
        self.begin(RemoteCall::Create {
            table: table.clone(),
            fields: fields.clone(),
        })
        .await?;

        let mut state = self.state.lock();
        state.next_id += 1;
        let record = Record {
            id: format!("rec{}", state.next_id),
            fields: fields.clone(),
            created_time: Utc::now(),
            updated_time: None,
            version: 0,
        };
        state
            .records
            .entry(table.clone())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        table: &TableKey,
        record_id: &str,
        fields: &Fields,
    ) -> RemoteResult<Record> {
        self.begin(RemoteCall::Update {
            table: table.clone(),
            record_id: record_id.to_string(),
            fields: fields.clone(),
        })
        .await?;

        let mut state = self.state.lock();
        let record = state
            .records
            .get_mut(table)
            .and_then(|records| records.iter_mut().find(|r| r.id == record_id))
            .ok_or_else(|| RemoteError::rejected(404, format!("record {record_id} not found")))?;
        record.fields = fields.clone();
        record.updated_time = Some(Utc::now());
        Ok(record.clone())
    }

    async fn delete(&self, table: &TableKey, record_id: &str) -> RemoteResult<()> {
        self.begin(RemoteCall::Delete {
            table: table.clone(),
            record_id: record_id.to_string(),
        })
        .await?;

        let mut state = self.state.lock();
        let records = state.records.entry(table.clone()).or_default();
        let before = records.len();
        records.retain(|r| r.id != record_id);
        if records.len() == before {
            return Err(RemoteError::rejected(
                404,
                format!("record {record_id} not found"),
            ));
        }
        Ok(())
    }

    async fn list(&self, table: &TableKey) -> RemoteResult<Vec<Record>> {
        self.begin(RemoteCall::List {
            table: table.clone(),
        })
        .await?;

        Ok(self.records(table))
    }
}
