//! Connectivity signal.
//!
//! The host application reports network reachability through a
//! [`ConnectivityReporter`]; the engine observes it through a
//! [`ConnectivityWatch`]. Both wrap a `tokio::sync::watch` channel holding
//! the current online flag.

use tokio::sync::watch;

/// Creates a connected reporter/watch pair starting at `initial`.
pub fn connectivity(initial: bool) -> (ConnectivityReporter, ConnectivityWatch) {
    let (tx, rx) = watch::channel(initial);
    (ConnectivityReporter { tx }, ConnectivityWatch { rx })
}

/// Publishes connectivity changes.
#[derive(Debug, Clone)]
pub struct ConnectivityReporter {
    tx: watch::Sender<bool>,
}

impl ConnectivityReporter {
    /// Reports the current reachability. Repeating the current value is a
    /// no-op and wakes no observer.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });

        if changed {
            tracing::debug!(online, "Connectivity changed");
        }
    }

    /// The last reported value.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Another observer of the same signal.
    pub fn watch(&self) -> ConnectivityWatch {
        ConnectivityWatch {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observes connectivity changes.
#[derive(Debug, Clone)]
pub struct ConnectivityWatch {
    rx: watch::Receiver<bool>,
}

impl ConnectivityWatch {
    /// The current value.
    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits for the next transition and returns the new value.
    /// Returns `None` once every reporter has been dropped.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_transitions() {
        let (reporter, mut watch) = connectivity(false);
        assert!(!watch.is_online());

        reporter.set_online(true);
        assert_eq!(watch.changed().await, Some(true));
        assert!(watch.is_online());
        assert!(reporter.is_online());
    }

    #[tokio::test]
    async fn repeated_value_is_not_a_transition() {
        let (reporter, mut watch) = connectivity(true);
        reporter.set_online(true);
        reporter.set_online(false);

        assert_eq!(watch.changed().await, Some(false));
    }

    #[tokio::test]
    async fn closed_when_reporter_dropped() {
        let (reporter, mut watch) = connectivity(true);
        drop(reporter);
        assert_eq!(watch.changed().await, None);
    }
}
