use std::sync::Arc;

use anyhow::{Context, Result};
use relay_context::RelayContext;
use relay_core::upstream::memory::{MemoryInboxConnector, MemoryTransportFactory};
use relay_core::{LimitsTable, MemoryStore, RelayConfig, RelaySettings};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = RelayConfig::new();
    config.load_env("RELAY__");
    let snapshot = config.snapshot();
    let settings = RelaySettings::from_snapshot(&snapshot);

    let store = match std::env::var("RELAY_TENANTS") {
        Ok(path) => {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading tenants from {path}"))?;
            let store = MemoryStore::from_json(&raw)
                .with_context(|| format!("parsing tenants from {path}"))?;
            info!(tenants = store.len(), "tenant store seeded");
            store
        }
        Err(_) => {
            warn!("RELAY_TENANTS not set, starting with an empty tenant store");
            MemoryStore::new()
        }
    };

    if settings.admin_key.is_none() {
        warn!("RELAY__ADMIN__KEY not set, usage report is disabled");
    }

    let addr = settings.listen_addr();
    let ctx = RelayContext::builder(settings)
        .limits(LimitsTable::from_snapshot(&snapshot))
        .store(Arc::new(store))
        .transports(Arc::new(MemoryTransportFactory::new()))
        .inbox_connector(Arc::new(MemoryInboxConnector::new()))
        .build()?;
    let ctx = Arc::new(ctx);
    ctx.spawn_sweepers();

    println!("[relay] listening on http://{addr}");

    relay_axum::build(ctx)
        .listen(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {}", e);
            }
            info!("shutdown signal received");
        })
        .await
}
