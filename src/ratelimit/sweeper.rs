//! Background eviction of idle rate limit entries.
//!
//! Without eviction every distinct key ever seen would stay in memory, so a
//! client cycling through user ids or addresses could grow the store
//! without bound. The sweeper runs on its own fixed interval, independent of
//! any key's window.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::store::LimiterStore;

/// Default time between two sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically calls [`LimiterStore::sweep`].
pub struct ExpirySweeper {
    store: Arc<LimiterStore>,
    interval: Duration,
}

impl ExpirySweeper {
    /// Create a sweeper for `store` that runs every `interval`.
    pub fn new(store: Arc<LimiterStore>, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// The time between two sweeps.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single sweep at `now` and return the number of evicted keys.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> usize {
        let removed = self.store.sweep(now);
        let remaining = self.store.len();

        if removed > 0 {
            info!(removed, remaining, "Cleaned up expired rate limit entries");
        } else {
            debug!(remaining, "No expired rate limit entries");
        }

        removed
    }

    /// Start sweeping on the current tokio runtime.
    ///
    /// The first sweep runs one full interval after this call.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.interval.as_millis() as u64, "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once(Utc::now());
                }
                // Fires on an explicit shutdown and when the handle is dropped
                _ = &mut shutdown => break,
            }
        }

        info!("Expiry sweeper stopped");
    }
}

/// Handle to a running sweeper. Dropping it stops the sweeper.
pub struct SweeperHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Expiry sweeper task ended abnormally");
        }
    }

    /// Whether the sweeper task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::LimitRule;
    use chrono::TimeDelta;
    use tokio_test::assert_ok;

    fn test_store() -> Arc<LimiterStore> {
        Arc::new(LimiterStore::new(LimitRule::new(3, 1000).unwrap()))
    }

    #[test]
    fn test_interval_is_never_zero() {
        let sweeper = ExpirySweeper::new(test_store(), Duration::ZERO);
        assert!(sweeper.interval() > Duration::ZERO);
    }

    #[test]
    fn test_sweep_once_reports_evictions() {
        let store = test_store();
        let now = Utc::now();
        store.check("user:idle", now - TimeDelta::seconds(10)).unwrap();
        store.check("user:active", now).unwrap();

        let sweeper = ExpirySweeper::new(store.clone(), DEFAULT_SWEEP_INTERVAL);
        assert_eq!(sweeper.sweep_once(now), 1);
        assert_eq!(sweeper.sweep_once(now), 0);
        assert_eq!(store.len(), 1);
        assert!(store.rule_for("user:active").is_some());
    }

    #[tokio::test]
    async fn test_spawned_sweeper_evicts_idle_entries() {
        let store = test_store();
        let now = Utc::now();
        store.check("user:idle", now - TimeDelta::seconds(10)).unwrap();
        store.check("user:busy", now).unwrap();

        let handle = ExpirySweeper::new(store.clone(), Duration::from_millis(20)).spawn();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(store.rule_for("user:idle").is_none());
        assert!(store.rule_for("user:busy").is_some());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_first_sweep_waits_one_interval() {
        let store = test_store();
        store
            .check("user:idle", Utc::now() - TimeDelta::seconds(10))
            .unwrap();

        let handle = ExpirySweeper::new(store.clone(), Duration::from_secs(3600)).spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let handle = ExpirySweeper::new(test_store(), Duration::from_secs(3600)).spawn();
        assert!(!handle.is_finished());

        assert_ok!(tokio::time::timeout(Duration::from_secs(1), handle.shutdown()).await);
    }
}
