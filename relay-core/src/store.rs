//! Metadata store seam.
//!
//! The store owns tenant records and the email activity log; the relay
//! reads tenants (through the profile cache), bumps usage counters and
//! appends one log entry per send attempt. `MemoryStore` backs tests and
//! the development server.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::tenant::{Tenant, TenantId};

/// Log entries `MemoryStore` keeps before dropping the oldest.
const RETAINED_EMAIL_LOGS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// One send attempt, as recorded in the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailLog {
    pub tenant_id: TenantId,
    pub to: String,
    pub status: DeliveryStatus,
    pub response_time_ms: u64,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch a tenant by identifier. `Ok(None)` means no such tenant.
    async fn fetch_tenant(&self, id: &TenantId) -> Result<Option<Tenant>>;

    /// Count one delivered email against the tenant's monthly and lifetime
    /// counters.
    async fn record_send(&self, id: &TenantId) -> Result<()>;

    /// Count one message read.
    async fn record_read(&self, id: &TenantId) -> Result<()>;

    /// Replace the tenant's profile and upstream configuration.
    async fn update_tenant(&self, tenant: Tenant) -> Result<()>;

    /// Every tenant record, for usage reporting.
    async fn list_tenants(&self) -> Result<Vec<Tenant>>;

    /// Append one entry to the email activity log.
    async fn log_email(&self, entry: EmailLog) -> Result<()>;

    /// Log entries at or after `since`, newest first, at most `limit`.
    async fn email_logs_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<EmailLog>>;

    /// Cheap round-trip used by health checks.
    async fn ping(&self) -> Result<()>;
}

/// In-process store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tenants: Arc<RwLock<HashMap<TenantId, Tenant>>>,
    email_logs: Arc<RwLock<VecDeque<EmailLog>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenants<I>(tenants: I) -> Self
    where
        I: IntoIterator<Item = Tenant>,
    {
        let store = Self::new();
        {
            let mut map = store.tenants.write();
            for tenant in tenants {
                map.insert(tenant.id.clone(), tenant);
            }
        }
        store
    }

    /// Seed from a JSON array of tenant records.
    pub fn from_json(raw: &str) -> Result<Self> {
        let tenants: Vec<Tenant> = serde_json::from_str(raw)?;
        Ok(Self::with_tenants(tenants))
    }

    pub fn insert(&self, tenant: Tenant) {
        self.tenants.write().insert(tenant.id.clone(), tenant);
    }

    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct read bypassing the async trait, for assertions.
    pub fn snapshot(&self, id: &TenantId) -> Option<Tenant> {
        self.tenants.read().get(id).cloned()
    }

    fn update<F>(&self, id: &TenantId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Tenant),
    {
        let mut tenants = self.tenants.write();
        let tenant = tenants
            .get_mut(id)
            .ok_or_else(|| anyhow!("tenant {id} does not exist"))?;
        f(tenant);
        tenant.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn fetch_tenant(&self, id: &TenantId) -> Result<Option<Tenant>> {
        Ok(self.tenants.read().get(id).cloned())
    }

    async fn record_send(&self, id: &TenantId) -> Result<()> {
        self.update(id, |t| {
            t.emails_sent_this_month += 1;
            t.total_emails_sent += 1;
            t.last_email_sent = Some(Utc::now());
        })
    }

    async fn record_read(&self, id: &TenantId) -> Result<()> {
        self.update(id, |t| {
            t.total_emails_read += 1;
            t.last_email_read = Some(Utc::now());
        })
    }

    async fn update_tenant(&self, tenant: Tenant) -> Result<()> {
        let id = tenant.id.clone();
        let mut tenants = self.tenants.write();
        if !tenants.contains_key(&id) {
            return Err(anyhow!("tenant {id} does not exist"));
        }
        tenants.insert(id, tenant);
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        Ok(self.tenants.read().values().cloned().collect())
    }

    async fn log_email(&self, entry: EmailLog) -> Result<()> {
        let mut logs = self.email_logs.write();
        if logs.len() == RETAINED_EMAIL_LOGS {
            logs.pop_front();
        }
        logs.push_back(entry);
        Ok(())
    }

    async fn email_logs_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<EmailLog>> {
        Ok(self
            .email_logs
            .read()
            .iter()
            .rev()
            .filter(|entry| entry.at >= since)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
