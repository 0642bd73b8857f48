use std::sync::Arc;

use relay_cache::TtlCache;
use relay_core::TenantId;
use tracing::debug;

use crate::keys::{listing_prefix, profile_key};
use crate::CachedValue;

/// A persisted change that may have made cached data stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// Profile or upstream configuration replaced.
    ConfigChanged,
    SendCounterIncremented,
    ReadCounterIncremented,
    /// Message flags changed upstream. `None` means any mailbox.
    MessagesChanged { mailbox: Option<String> },
}

impl MutationKind {
    /// Listing pattern to evict besides the profile, if any.
    fn listing_scope(&self) -> Option<Option<&str>> {
        match self {
            MutationKind::ConfigChanged => Some(None),
            MutationKind::MessagesChanged { mailbox } => Some(mailbox.as_deref()),
            MutationKind::SendCounterIncremented | MutationKind::ReadCounterIncremented => None,
        }
    }
}

/// Evicts a tenant's cached entries after a mutation.
///
/// The profile entry always goes; listings go only for kinds that can
/// change what an inbox page shows. Rate windows are never touched.
#[derive(Clone)]
pub struct InvalidationBridge {
    cache: Arc<TtlCache<CachedValue>>,
}

impl InvalidationBridge {
    pub fn new(cache: Arc<TtlCache<CachedValue>>) -> Self {
        Self { cache }
    }

    /// Evict synchronously. Returns the number of entries removed.
    ///
    /// Config changes and mark-read call this before answering, so the next
    /// read in this process is fresh. Counter updates call it from their
    /// detached task.
    pub fn on_mutation(&self, tenant: &TenantId, kind: &MutationKind) -> usize {
        let mut removed = usize::from(self.cache.delete(&profile_key(tenant)));
        if let Some(mailbox) = kind.listing_scope() {
            removed += self.cache.delete_prefix(&listing_prefix(tenant, mailbox));
        }
        debug!(tenant_id = %tenant, ?kind, removed, "cache invalidated");
        removed
    }
}
