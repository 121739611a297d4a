//! Background sync triggers.
//!
//! Two tasks run per engine: one follows the connectivity signal and starts
//! a sync once the connection has been back for the debounce window, the
//! other drains the queue on a timer. Both hold only a weak reference and
//! end when the engine is gone.

use crate::connectivity::ConnectivityWatch;
use crate::events::SyncEvent;
use crate::SyncEngine;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub(crate) fn spawn(engine: &Arc<SyncEngine>) -> Vec<JoinHandle<()>> {
    let config = engine.config();

    vec![
        tokio::spawn(follow_connectivity(
            Arc::downgrade(engine),
            engine.connectivity(),
            config.reconnect_debounce,
        )),
        tokio::spawn(sync_periodically(
            Arc::downgrade(engine),
            config.sync_interval,
        )),
    ]
}

async fn follow_connectivity(
    engine: Weak<SyncEngine>,
    mut connectivity: ConnectivityWatch,
    debounce: Duration,
) {
    let mut reconnect_at: Option<Instant> = None;

    loop {
        let next = match reconnect_at {
            Some(deadline) => tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    reconnect_at = None;
                    let Some(engine) = engine.upgrade() else { break };
                    if engine.is_online() {
                        tracing::debug!("Connection stable, starting sync");
                        tokio::spawn(async move {
                            engine.sync().await;
                        });
                    }
                    continue;
                }
                next = connectivity.changed() => next,
            },
            None => connectivity.changed().await,
        };

        let Some(online) = next else { break };
        let Some(engine) = engine.upgrade() else { break };

        if online {
            tracing::info!("Online");
            engine.events.emit(SyncEvent::Online);
            // A new transition inside the window restarts it.
            reconnect_at = Some(Instant::now() + debounce);
        } else {
            tracing::info!("Offline");
            engine.events.emit(SyncEvent::Offline);
            reconnect_at = None;
        }
    }

    tracing::debug!("Connectivity trigger stopped");
}

async fn sync_periodically(engine: Weak<SyncEngine>, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        let Some(engine) = engine.upgrade() else { break };
        if engine.is_online() && !engine.is_syncing() && engine.pending_operations_count() > 0 {
            tracing::debug!(
                pending = engine.pending_operations_count(),
                "Periodic sync"
            );
            engine.sync().await;
        }
    }
}
