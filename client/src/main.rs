//! Tablesync agent - keeps a local replica and drains its queue.
//!
//! Reads its configuration from the environment (and `.env`), restores the
//! state file, and replays queued operations on a timer until Ctrl-C.

use std::sync::Arc;
use tablesync_client::{
    connectivity, HttpRemote, JsonFileStore, RemoteConfig, SyncConfig, SyncEngine, SyncEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tablesync_client=debug,tablesync_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let remote_config = RemoteConfig::from_env()?;
    let sync_config = SyncConfig::from_env()?;

    tracing::info!(
        api_url = %remote_config.api_url,
        state_path = %remote_config.state_path.display(),
        "Starting Tablesync agent"
    );

    let remote = HttpRemote::from_config(&remote_config, sync_config.request_timeout)?;
    let store = JsonFileStore::new(&remote_config.state_path);

    // The agent has no reachability probe; it assumes the backend is up and
    // lets failed replays count against the retry ceiling.
    let (_reporter, watch) = connectivity(true);
    let engine = SyncEngine::open(sync_config, Arc::new(remote), Arc::new(store), watch).await?;

    let mut events = engine.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::OperationFailed { operation, error }) => {
                    tracing::error!(
                        op_id = %operation.id,
                        kind = %operation.kind,
                        table = %operation.table_key,
                        error = %error,
                        "Operation dropped"
                    );
                }
                Ok(SyncEvent::CacheUpdated { table, records }) => {
                    tracing::debug!(table = %table, records = records.len(), "Cache updated");
                }
                Ok(event) => tracing::debug!(?event, "Sync event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    engine.sync().await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    if let Some(summary) = engine.sync().await {
        tracing::info!(
            confirmed = summary.confirmed,
            pending = engine.pending_operations_count(),
            "Final sync finished"
        );
    }
    engine.shutdown();
    logger.abort();

    Ok(())
}
