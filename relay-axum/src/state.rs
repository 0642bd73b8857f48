use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use relay_context::RelayContext;

/// Process-lifetime request counters reported by `/health`.
#[derive(Debug, Default)]
pub struct HttpMetrics {
    requests: AtomicU64,
    errors: AtomicU64,
}

impl HttpMetrics {
    pub fn record(&self, failed: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct RelayState {
    pub ctx: Arc<RelayContext>,
    pub metrics: Arc<HttpMetrics>,
}

impl RelayState {
    pub fn new(ctx: Arc<RelayContext>) -> Self {
        Self {
            ctx,
            metrics: Arc::new(HttpMetrics::default()),
        }
    }
}
