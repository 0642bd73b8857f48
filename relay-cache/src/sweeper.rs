use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::TtlCache;

/// Background task that reclaims expired cache entries.
///
/// Reads never depend on it; it only bounds memory held by keys nobody
/// asks for again (stale rate windows, abandoned listings).
pub struct Sweeper<V> {
    cache: Arc<TtlCache<V>>,
    interval: Duration,
}

/// Handle for stopping a spawned sweeper.
pub struct SweeperHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.join_handle.await {
            warn!("cache sweeper join error: {}", e);
        }
    }
}

impl<V> Sweeper<V>
where
    V: Send + Sync + 'static,
{
    /// Sweep every 60 seconds.
    pub fn new(cache: Arc<TtlCache<V>>) -> Self {
        Self {
            cache,
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(cache: Arc<TtlCache<V>>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Run one sweep cycle.
    pub fn sweep_once(&self) -> usize {
        let removed = self.cache.sweep_expired();
        if removed > 0 {
            debug!(cache = self.cache.name(), removed, "swept expired entries");
        }
        removed
    }

    /// Start the sweeper on the current tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle {
            shutdown_tx,
            join_handle,
        }
    }

    async fn run(self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            cache = self.cache.name(),
            "starting cache sweeper with interval: {:?}", self.interval
        );

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    self.sweep_once();
                }
            }
        }

        debug!(cache = self.cache.name(), "cache sweeper stopped");
    }
}
