use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use relay_core::{
    OutboundConfig, OutboundMessage, RelayError, RelayResult, RelayTransport, SendReceipt,
    TransportFactory, TransportOptions,
};
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tracing::{debug, instrument};

use crate::PoolKey;

/// Outbound transport shared by every tenant whose relay config maps to
/// the same `PoolKey`.
///
/// Callers never wait in the pool; they wait here, for one of
/// `max_connections` slots and for the send-rate window.
pub struct PooledTransport {
    key: PoolKey,
    inner: Arc<dyn RelayTransport>,
    connections: Semaphore,
    rate: RateGate,
    options: TransportOptions,
}

impl PooledTransport {
    pub fn build(
        factory: &dyn TransportFactory,
        config: &OutboundConfig,
        options: &TransportOptions,
    ) -> Result<Self> {
        let inner = factory.build(config, options)?;
        Ok(Self::new(PoolKey::from(config), inner, options.clone()))
    }

    pub fn new(key: PoolKey, inner: Arc<dyn RelayTransport>, options: TransportOptions) -> Self {
        Self {
            key,
            inner,
            connections: Semaphore::new(options.max_connections.max(1)),
            rate: RateGate::new(options.rate_limit, options.rate_window),
            options,
        }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Connection slots currently taken.
    pub fn in_use(&self) -> usize {
        self.options.max_connections.max(1) - self.connections.available_permits()
    }

    #[instrument(skip(self, message), fields(pool_key = %self.key))]
    pub async fn send(&self, message: &OutboundMessage) -> RelayResult<SendReceipt> {
        // A sender held back by the rate window must not sit on a slot.
        self.rate.reserve().await;

        let _slot = self
            .connections
            .acquire()
            .await
            .map_err(|_| RelayError::upstream("relay transport has been closed"))?;

        match timeout(self.options.socket_timeout, self.inner.send(message)).await {
            Ok(Ok(receipt)) => {
                debug!(message_id = %receipt.message_id, "relay accepted message");
                Ok(receipt)
            }
            Ok(Err(e)) => Err(RelayError::upstream(e)),
            Err(_) => Err(RelayError::UpstreamTimeout {
                operation: "send",
                after: self.options.socket_timeout,
            }),
        }
    }

    /// Refuse new sends and close the underlying connections.
    pub async fn close(&self) {
        self.connections.close();
        self.inner.close().await;
    }
}

/// Fixed-window send-rate ceiling. A limit of 0 disables it.
struct RateGate {
    limit: u32,
    window: Duration,
    state: Mutex<RateWindow>,
}

struct RateWindow {
    started: Instant,
    used: u32,
}

impl RateGate {
    fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(RateWindow {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    async fn reserve(&self) {
        if self.limit == 0 {
            return;
        }
        loop {
            let wait = {
                let mut state = self.state.lock();
                let now = Instant::now();
                if now.duration_since(state.started) >= self.window {
                    state.started = now;
                    state.used = 0;
                }
                if state.used < self.limit {
                    state.used += 1;
                    return;
                }
                (state.started + self.window).saturating_duration_since(now)
            };
            tokio::time::sleep(wait).await;
        }
    }
}
