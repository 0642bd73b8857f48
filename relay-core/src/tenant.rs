//! Core multi-tenant types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::PlanTier;

/// Opaque tenant identifier, taken verbatim from the caller's API key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Outbound relay (SMTP-style) connection parameters owned by a tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub from_name: Option<String>,
}

impl fmt::Debug for OutboundConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("from_name", &self.from_name)
            .finish()
    }
}

impl OutboundConfig {
    /// RFC 5322 style sender built from the display name and the relay user.
    pub fn sender(&self) -> String {
        match &self.from_name {
            Some(name) if !name.is_empty() => format!("\"{}\" <{}>", name, self.user),
            _ => self.user.clone(),
        }
    }
}

/// Inbox-read (IMAP-style) connection parameters owned by a tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
    pub user: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl fmt::Debug for InboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl InboxConfig {
    /// An inbox is usable only when host and credentials are all present.
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.user.is_empty() && !self.password.is_empty()
    }
}

/// Tenant record as served by the metadata store.
///
/// The relay never mutates a `Tenant` in place; cached copies are shared
/// behind an `Arc` and replaced wholesale on refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub plan: PlanTier,
    #[serde(default)]
    pub emails_sent_this_month: u64,
    #[serde(default)]
    pub total_emails_sent: u64,
    #[serde(default)]
    pub total_emails_read: u64,
    #[serde(default)]
    pub outbound: Option<OutboundConfig>,
    #[serde(default)]
    pub inbox: Option<InboxConfig>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_email_sent: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_email_read: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn new<S: Into<String>>(id: S, plan: PlanTier) -> Self {
        let now = Utc::now();
        Self {
            id: TenantId(id.into()),
            email: String::new(),
            plan,
            emails_sent_this_month: 0,
            total_emails_sent: 0,
            total_emails_read: 0,
            outbound: None,
            inbox: None,
            created_at: now,
            updated_at: now,
            last_email_sent: None,
            last_email_read: None,
        }
    }

    pub fn with_outbound(mut self, outbound: OutboundConfig) -> Self {
        self.outbound = Some(outbound);
        self
    }

    pub fn with_inbox(mut self, inbox: InboxConfig) -> Self {
        self.inbox = Some(inbox);
        self
    }
}
