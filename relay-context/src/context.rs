use std::sync::Arc;

use anyhow::bail;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_admission::AdmissionController;
use relay_cache::{Sweeper, SweeperHandle, TtlCache};
use relay_core::{
    Clock, EmailLog, InboxConnector, InboxMessage, LimitsTable, MetadataStore, RelayError, RelayResult,
    RelaySettings, SystemClock, Tenant, TenantId, TransportFactory,
};
use relay_pool::PoolManager;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::keys::profile_key;
use crate::timeout::with_upstream_timeout;
use crate::{InvalidationBridge, MutationKind};

type StoreInit = dyn Fn() -> anyhow::Result<Arc<dyn MetadataStore>> + Send + Sync;

/// What the shared response cache holds.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Profile(Arc<Tenant>),
    Listing(Arc<Vec<InboxMessage>>),
}

/// Everything request handlers share within one process.
pub struct RelayContext {
    settings: RelaySettings,
    clock: Arc<dyn Clock>,
    cache: Arc<TtlCache<CachedValue>>,
    admission: Arc<AdmissionController>,
    pools: Arc<PoolManager>,
    invalidation: InvalidationBridge,
    store_init: Arc<StoreInit>,
    sweepers: Mutex<Vec<SweeperHandle>>,
    started_at: DateTime<Utc>,
}

impl RelayContext {
    pub fn builder(settings: RelaySettings) -> RelayContextBuilder {
        RelayContextBuilder::new(settings)
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn cache(&self) -> &Arc<TtlCache<CachedValue>> {
        &self.cache
    }

    pub fn pools(&self) -> &Arc<PoolManager> {
        &self.pools
    }

    pub fn invalidation(&self) -> &InvalidationBridge {
        &self.invalidation
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Shared metadata-store client, created on first use.
    pub fn store(&self) -> RelayResult<Arc<dyn MetadataStore>> {
        let init = Arc::clone(&self.store_init);
        self.pools.metadata_client(move || init())
    }

    /// Start the response-cache and rate-window sweepers on the current
    /// runtime. Calling it twice is a no-op.
    pub fn spawn_sweepers(&self) {
        let mut sweepers = self.sweepers.lock();
        if !sweepers.is_empty() {
            return;
        }
        sweepers.push(
            Sweeper::with_interval(Arc::clone(&self.cache), self.settings.cache_sweep_interval)
                .spawn(),
        );
        sweepers.push(
            Sweeper::with_interval(self.admission.windows(), self.settings.rate_sweep_interval)
                .spawn(),
        );
    }

    /// Cache-aside tenant lookup: `profile:<id>` first, then the store.
    #[instrument(skip(self), fields(tenant_id = %id))]
    pub async fn resolve_tenant(&self, id: &TenantId) -> RelayResult<Arc<Tenant>> {
        if id.as_str().trim().is_empty() {
            return Err(RelayError::MissingApiKey);
        }

        let key = profile_key(id);
        if let Some(cached) = self.cache.get(&key) {
            if let CachedValue::Profile(tenant) = cached.as_ref() {
                return Ok(Arc::clone(tenant));
            }
        }

        let store = self.store()?;
        let fetched = with_upstream_timeout(
            "tenant lookup",
            self.settings.upstream_timeout,
            async { store.fetch_tenant(id).await.map_err(RelayError::store) },
        )
        .await?;

        let tenant = Arc::new(fetched.ok_or_else(|| RelayError::TenantNotFound(id.to_string()))?);
        self.cache.set(
            key,
            CachedValue::Profile(Arc::clone(&tenant)),
            self.settings.cache_ttl,
        );
        debug!("tenant profile cached");
        Ok(tenant)
    }

    /// Replace a tenant's profile in the store, then drop everything cached
    /// for it.
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id))]
    pub async fn update_tenant(&self, tenant: Tenant) -> RelayResult<()> {
        let id = tenant.id.clone();
        let store = self.store()?;
        with_upstream_timeout("tenant update", self.settings.upstream_timeout, async {
            store.update_tenant(tenant).await.map_err(RelayError::store)
        })
        .await?;

        self.invalidation.on_mutation(&id, &MutationKind::ConfigChanged);
        Ok(())
    }

    /// Count one sent email in the background, then invalidate.
    ///
    /// One attempt only; a failure is logged and the count is lost.
    pub fn record_send_detached(&self, tenant: &TenantId) -> JoinHandle<()> {
        self.record_detached(tenant, Counter::Sent)
    }

    pub fn record_read_detached(&self, tenant: &TenantId) -> JoinHandle<()> {
        self.record_detached(tenant, Counter::Read)
    }

    fn record_detached(&self, tenant: &TenantId, counter: Counter) -> JoinHandle<()> {
        let store = self.store();
        let bridge = self.invalidation.clone();
        let after = self.settings.upstream_timeout;
        let tenant = tenant.clone();

        tokio::spawn(async move {
            let store = match store {
                Ok(store) => store,
                Err(e) => {
                    warn!(tenant_id = %tenant, ?counter, "counter update skipped: {}", e);
                    return;
                }
            };

            let recorded = with_upstream_timeout("counter update", after, async {
                match counter {
                    Counter::Sent => store.record_send(&tenant).await,
                    Counter::Read => store.record_read(&tenant).await,
                }
            })
            .await;

            match recorded {
                Ok(()) => {
                    bridge.on_mutation(&tenant, &counter.mutation());
                }
                Err(e) => warn!(tenant_id = %tenant, ?counter, "counter update failed: {}", e),
            }
        })
    }

    /// Append to the activity log in the background. One attempt; a
    /// failure is logged and the entry is lost.
    pub fn log_email_detached(&self, entry: EmailLog) -> JoinHandle<()> {
        let store = self.store();
        let after = self.settings.upstream_timeout;

        tokio::spawn(async move {
            let tenant = entry.tenant_id.clone();
            let logged = match store {
                Ok(store) => {
                    with_upstream_timeout("activity log", after, store.log_email(entry)).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = logged {
                warn!(tenant_id = %tenant, "email activity not logged: {}", e);
            }
        })
    }

    /// Stop the sweepers, close every pooled resource and empty the caches.
    pub async fn shutdown(&self) {
        let sweepers: Vec<SweeperHandle> = self.sweepers.lock().drain(..).collect();
        for handle in sweepers {
            handle.shutdown().await;
        }

        let closed = self.pools.drain_all().await;
        self.cache.flush_all();
        self.admission.windows().flush_all();

        info!(closed, "relay context shut down");
    }
}

/// Usage counter bumped after a completed operation.
#[derive(Debug, Clone, Copy)]
enum Counter {
    Sent,
    Read,
}

impl Counter {
    fn mutation(self) -> MutationKind {
        match self {
            Counter::Sent => MutationKind::SendCounterIncremented,
            Counter::Read => MutationKind::ReadCounterIncremented,
        }
    }
}

/// Assembles a [`RelayContext`].
pub struct RelayContextBuilder {
    settings: RelaySettings,
    limits: LimitsTable,
    clock: Arc<dyn Clock>,
    store_init: Option<Arc<StoreInit>>,
    transports: Option<Arc<dyn TransportFactory>>,
    inbox_connector: Option<Arc<dyn InboxConnector>>,
}

impl RelayContextBuilder {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            limits: LimitsTable::default(),
            clock: Arc::new(SystemClock),
            store_init: None,
            transports: None,
            inbox_connector: None,
        }
    }

    pub fn limits(mut self, limits: LimitsTable) -> Self {
        self.limits = limits;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use an already-built store client.
    pub fn store(self, store: Arc<dyn MetadataStore>) -> Self {
        self.store_with(move || Ok(Arc::clone(&store)))
    }

    /// Build the store client lazily on first use.
    pub fn store_with<F>(mut self, init: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn MetadataStore>> + Send + Sync + 'static,
    {
        self.store_init = Some(Arc::new(init));
        self
    }

    pub fn transports(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(factory);
        self
    }

    pub fn inbox_connector(mut self, connector: Arc<dyn InboxConnector>) -> Self {
        self.inbox_connector = Some(connector);
        self
    }

    pub fn build(self) -> anyhow::Result<RelayContext> {
        let Some(store_init) = self.store_init else {
            bail!("relay context needs a metadata store");
        };
        let Some(transports) = self.transports else {
            bail!("relay context needs an outbound transport factory");
        };
        let Some(inbox_connector) = self.inbox_connector else {
            bail!("relay context needs an inbox connector");
        };

        let options = self.settings.transport_options();

        let cache = Arc::new(
            TtlCache::with_clock("responses", Arc::clone(&self.clock))
                .with_default_ttl(self.settings.cache_ttl),
        );
        let admission = Arc::new(AdmissionController::with_clock(
            self.limits,
            Arc::clone(&self.clock),
        ));
        let pools = Arc::new(PoolManager::new(transports, inbox_connector).with_options(options));

        Ok(RelayContext {
            started_at: self.clock.now(),
            invalidation: InvalidationBridge::new(Arc::clone(&cache)),
            settings: self.settings,
            clock: self.clock,
            cache,
            admission,
            pools,
            store_init,
            sweepers: Mutex::new(Vec::new()),
        })
    }
}
