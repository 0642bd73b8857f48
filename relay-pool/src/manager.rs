use std::sync::Arc;

use anyhow::bail;
use parking_lot::RwLock;
use relay_core::{
    InboxClient, InboxConfig, InboxConnector, MetadataStore, OutboundConfig, RelayError,
    RelayResult, TransportFactory, TransportOptions,
};
use tracing::{info, instrument};

use crate::{KeyedPool, PoolKey, PooledTransport};

/// Owns every pooled upstream resource of the process.
///
/// - one metadata-store client, shared by all tenants
/// - outbound transports keyed by relay host/port/user
/// - inbox clients keyed by inbox host/port/user
pub struct PoolManager {
    metadata: RwLock<Option<Arc<dyn MetadataStore>>>,
    outbound: KeyedPool<PooledTransport>,
    inbox: KeyedPool<dyn InboxClient>,
    transports: Arc<dyn TransportFactory>,
    inbox_connector: Arc<dyn InboxConnector>,
    options: TransportOptions,
}

impl PoolManager {
    pub fn new(
        transports: Arc<dyn TransportFactory>,
        inbox_connector: Arc<dyn InboxConnector>,
    ) -> Self {
        Self {
            metadata: RwLock::new(None),
            outbound: KeyedPool::new("outbound"),
            inbox: KeyedPool::new("inbox"),
            transports,
            inbox_connector,
            options: TransportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// The process-wide metadata-store client, built by `init` on first use.
    pub fn metadata_client<F>(&self, init: F) -> RelayResult<Arc<dyn MetadataStore>>
    where
        F: FnOnce() -> anyhow::Result<Arc<dyn MetadataStore>>,
    {
        if let Some(client) = self.metadata.read().as_ref() {
            return Ok(Arc::clone(client));
        }

        let mut slot = self.metadata.write();
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        let client = init().map_err(RelayError::pool_construction)?;
        *slot = Some(Arc::clone(&client));
        info!("metadata store client created");
        Ok(client)
    }

    /// Shared outbound transport for `config`. Never waits for a free
    /// connection; that happens inside [`PooledTransport::send`].
    #[instrument(skip(self, config), fields(host = %config.host, port = config.port))]
    pub fn acquire_outbound(&self, config: &OutboundConfig) -> RelayResult<Arc<PooledTransport>> {
        let key = PoolKey::from(config);
        self.outbound.get_or_try_insert_with(&key, || {
            validate_endpoint(&config.host, config.port, &config.user)?;
            let transport = PooledTransport::build(self.transports.as_ref(), config, &self.options)?;
            Ok(Arc::new(transport))
        })
    }

    #[instrument(skip(self, config), fields(host = %config.host, port = config.port))]
    pub fn acquire_inbox(&self, config: &InboxConfig) -> RelayResult<Arc<dyn InboxClient>> {
        let key = PoolKey::from(config);
        self.inbox.get_or_try_insert_with(&key, || {
            validate_endpoint(&config.host, config.port, &config.user)?;
            self.inbox_connector.build(config)
        })
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    /// Close every pooled resource and clear the pools. Shutdown only.
    ///
    /// Returns how many upstream resources were closed.
    pub async fn drain_all(&self) -> usize {
        let outbound = self.outbound.drain();
        let inbox = self.inbox.drain();
        let closed = outbound.len() + inbox.len();

        for (_, transport) in outbound {
            transport.close().await;
        }
        for (_, client) in inbox {
            client.close().await;
        }
        self.metadata.write().take();

        info!(closed, "connection pools drained");
        closed
    }
}

fn validate_endpoint(host: &str, port: u16, user: &str) -> anyhow::Result<()> {
    if host.trim().is_empty() {
        bail!("upstream host is empty");
    }
    if port == 0 {
        bail!("upstream port must be non-zero");
    }
    if user.trim().is_empty() {
        bail!("upstream user is empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::upstream::memory::{MemoryInboxConnector, MemoryTransportFactory};
    use relay_core::MemoryStore;

    fn outbound(host: &str, user: &str) -> OutboundConfig {
        OutboundConfig {
            host: host.into(),
            port: 587,
            secure: false,
            user: user.into(),
            password: "pw".into(),
            from_name: None,
        }
    }

    fn inbox(host: &str, user: &str) -> InboxConfig {
        InboxConfig {
            host: host.into(),
            port: 993,
            secure: true,
            user: user.into(),
            password: "pw".into(),
        }
    }

    fn manager() -> (PoolManager, MemoryTransportFactory, MemoryInboxConnector) {
        let factory = MemoryTransportFactory::new();
        let connector = MemoryInboxConnector::new();
        let pools = PoolManager::new(Arc::new(factory.clone()), Arc::new(connector.clone()));
        (pools, factory, connector)
    }

    #[test]
    fn identical_parameters_share_one_transport() {
        let (pools, factory, _) = manager();

        let a = pools.acquire_outbound(&outbound("smtp.example.com", "shared")).unwrap();
        let b = pools.acquire_outbound(&outbound("smtp.example.com", "shared")).unwrap();
        let c = pools.acquire_outbound(&outbound("smtp.example.com", "other")).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(factory.builds(), 2);
        assert_eq!(pools.outbound_len(), 2);
    }

    #[test]
    fn construction_failure_is_surfaced_and_retryable() {
        let (pools, factory, _) = manager();
        factory.reject_host("smtp.broken.example");

        let err = pools
            .acquire_outbound(&outbound("smtp.broken.example", "u"))
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::PoolConstructionFailed { .. }));
        assert_eq!(pools.outbound_len(), 0);

        factory.accept_host("smtp.broken.example");
        assert!(pools.acquire_outbound(&outbound("smtp.broken.example", "u")).is_ok());
    }

    #[test]
    fn invalid_endpoint_never_reaches_factory() {
        let (pools, factory, _) = manager();
        let mut cfg = outbound("smtp.example.com", "u");
        cfg.port = 0;

        assert!(pools.acquire_outbound(&cfg).is_err());
        assert_eq!(factory.builds(), 0);
    }

    #[test]
    fn inbox_clients_are_pooled_by_parameters() {
        let (pools, _, connector) = manager();

        let a = pools.acquire_inbox(&inbox("imap.example.com", "r")).unwrap();
        let b = pools.acquire_inbox(&inbox("IMAP.example.com", "r")).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.builds(), 1);
    }

    #[test]
    fn metadata_client_is_built_once() {
        let (pools, _, _) = manager();
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());

        let first = pools.metadata_client(|| Ok(Arc::clone(&store))).unwrap();
        let second = pools
            .metadata_client(|| panic!("metadata client rebuilt"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn drain_closes_everything() {
        let (pools, factory, connector) = manager();
        pools.acquire_outbound(&outbound("a.example.com", "u")).unwrap();
        pools.acquire_outbound(&outbound("b.example.com", "u")).unwrap();
        pools.acquire_inbox(&inbox("imap.example.com", "r")).unwrap();

        assert_eq!(pools.drain_all().await, 3);
        assert_eq!(factory.closed(), 2);
        assert_eq!(connector.closed(), 1);
        assert_eq!(pools.outbound_len(), 0);
        assert_eq!(pools.inbox_len(), 0);
    }
}
