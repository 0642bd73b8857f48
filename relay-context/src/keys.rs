//! Cache key layout.
//!
//! - `profile:<tenant>` holds the resolved tenant record
//! - `listing:<tenant>:<mailbox>:<limit>:<unread|all>` holds one inbox page
//!
//! Tenant ids and mailbox names are escaped so a `:` inside them cannot
//! make one tenant's prefix cover another tenant's keys.

use std::borrow::Cow;

use relay_core::{InboxQuery, TenantId};

fn component(raw: &str) -> Cow<'_, str> {
    if raw.contains([':', '%']) {
        Cow::Owned(raw.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(raw)
    }
}

pub fn profile_key(tenant: &TenantId) -> String {
    format!("profile:{}", component(&tenant.0))
}

pub fn listing_key(tenant: &TenantId, query: &InboxQuery) -> String {
    let filter = if query.unread_only { "unread" } else { "all" };
    format!(
        "listing:{}:{}:{}:{filter}",
        component(&tenant.0),
        component(&query.mailbox),
        query.limit
    )
}

/// Literal key prefix shared by a tenant's listings, optionally narrowed
/// to one mailbox.
pub fn listing_prefix(tenant: &TenantId, mailbox: Option<&str>) -> String {
    match mailbox {
        Some(mailbox) => format!("listing:{}:{}:", component(&tenant.0), component(mailbox)),
        None => format!("listing:{}:", component(&tenant.0)),
    }
}
