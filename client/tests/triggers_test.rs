//! Background trigger tests on paused time.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tablesync_client::{
    connectivity, ConnectivityReporter, Fields, MemoryStore, MockRemote, RemoteError, SyncConfig,
    SyncEngine, SyncEvent, TableKey,
};
use tokio::time::sleep;

fn table() -> TableKey {
    "base1:tbl1".parse().unwrap()
}

fn fields(name: &str) -> Fields {
    json!({ "Name": name }).as_object().cloned().unwrap()
}

fn config() -> SyncConfig {
    SyncConfig::default()
        .with_reconnect_debounce(Duration::from_secs(1))
        .with_sync_interval(Duration::from_secs(10))
}

async fn open(online: bool) -> (Arc<SyncEngine>, Arc<MockRemote>, ConnectivityReporter) {
    let remote = Arc::new(MockRemote::new());
    let (reporter, watch) = connectivity(online);
    let engine = SyncEngine::open(config(), remote.clone(), Arc::new(MemoryStore::new()), watch)
        .await
        .unwrap();
    (engine, remote, reporter)
}

#[tokio::test(start_paused = true)]
async fn reconnect_syncs_after_quiet_period() {
    let (engine, remote, reporter) = open(false).await;
    engine.create_record(&table(), fields("A")).await.unwrap();
    assert_eq!(engine.pending_operations_count(), 1);

    let mut events = engine.subscribe();
    reporter.set_online(true);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(engine.pending_operations_count(), 1);
    assert_eq!(remote.call_count(), 0);

    sleep(Duration::from_millis(600)).await;
    assert_eq!(engine.pending_operations_count(), 0);
    assert_eq!(remote.records(&table()).len(), 1);

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(received.first(), Some(&SyncEvent::Online));
    assert_eq!(
        received
            .iter()
            .filter(|e| matches!(e, SyncEvent::SyncComplete(_)))
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn flapping_connection_restarts_the_window() {
    let (engine, remote, reporter) = open(false).await;
    engine.create_record(&table(), fields("A")).await.unwrap();
    let mut events = engine.subscribe();

    reporter.set_online(true);
    sleep(Duration::from_millis(500)).await;
    reporter.set_online(false);
    sleep(Duration::from_millis(200)).await;
    reporter.set_online(true);

    // One second after the first transition, but only 0.8s after the last
    sleep(Duration::from_millis(800)).await;
    assert_eq!(remote.call_count(), 0);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(engine.pending_operations_count(), 0);

    let mut transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        if matches!(event, SyncEvent::Online | SyncEvent::Offline) {
            transitions.push(event);
        }
    }
    assert_eq!(
        transitions,
        vec![SyncEvent::Online, SyncEvent::Offline, SyncEvent::Online]
    );
}

#[tokio::test(start_paused = true)]
async fn going_offline_cancels_the_pending_sync() {
    let (engine, remote, reporter) = open(false).await;
    engine.create_record(&table(), fields("A")).await.unwrap();

    reporter.set_online(true);
    sleep(Duration::from_millis(200)).await;
    reporter.set_online(false);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(remote.call_count(), 0);
    assert_eq!(engine.pending_operations_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn periodic_sync_drains_the_queue() {
    let (engine, remote, _reporter) = open(true).await;
    remote.push_failure(RemoteError::Network("reset".into()));
    engine.create_record(&table(), fields("A")).await.unwrap();
    assert_eq!(engine.pending_operations_count(), 1);

    sleep(Duration::from_secs(9)).await;
    assert_eq!(engine.pending_operations_count(), 1);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(engine.pending_operations_count(), 0);
    assert_eq!(remote.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn periodic_sync_skips_when_offline() {
    let (engine, remote, _reporter) = open(false).await;
    engine.create_record(&table(), fields("A")).await.unwrap();

    sleep(Duration::from_secs(35)).await;

    assert_eq!(remote.call_count(), 0);
    assert_eq!(engine.pending_operations_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn periodic_sync_skips_empty_queue() {
    let (engine, _remote, _reporter) = open(true).await;
    let mut events = engine.subscribe();

    sleep(Duration::from_secs(35)).await;

    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_triggers() {
    let (engine, remote, _reporter) = open(true).await;
    remote.push_failure(RemoteError::Network("reset".into()));
    engine.create_record(&table(), fields("A")).await.unwrap();

    engine.shutdown();
    sleep(Duration::from_secs(35)).await;

    assert_eq!(engine.pending_operations_count(), 1);
    assert_eq!(remote.call_count(), 1);
}
