//! Upstream protocol seams.
//!
//! Wire-level semantics of the outbound relay and the inbox protocol are
//! opaque to the relay: it only builds clients from tenant configuration,
//! sends, lists, marks read and closes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tenant::{InboxConfig, OutboundConfig};

pub mod memory;

/// Limits a pooled outbound transport is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Hard cap on simultaneously open connections for one pool key.
    pub max_connections: usize,
    /// Messages sent over one connection before it is recycled.
    pub max_messages: usize,
    /// Messages allowed per `rate_window`.
    pub rate_limit: u32,
    pub rate_window: Duration,
    pub connection_timeout: Duration,
    pub greeting_timeout: Duration,
    pub socket_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            max_messages: 100,
            rate_limit: 50,
            rate_window: Duration::from_secs(1),
            connection_timeout: Duration::from_secs(60),
            greeting_timeout: Duration::from_secs(30),
            socket_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    /// Base64 content.
    pub content: String,
    #[serde(default, rename = "contentType")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxQuery {
    pub mailbox: String,
    pub limit: usize,
    pub unread_only: bool,
}

impl Default for InboxQuery {
    fn default() -> Self {
        Self {
            mailbox: "INBOX".to_string(),
            limit: 50,
            unread_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxMessage {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub date: String,
    pub seen: bool,
    #[serde(default)]
    pub preview: Option<String>,
}

#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt>;

    /// Close every open connection. Called once, when the pool drains.
    async fn close(&self);
}

/// Builds outbound transports. Construction is synchronous and must not
/// connect; connecting happens lazily on first send.
pub trait TransportFactory: Send + Sync {
    fn build(
        &self,
        config: &OutboundConfig,
        options: &TransportOptions,
    ) -> Result<Arc<dyn RelayTransport>>;
}

#[async_trait]
pub trait InboxClient: Send + Sync {
    async fn list(&self, query: &InboxQuery) -> Result<Vec<InboxMessage>>;

    async fn mark_read(&self, mailbox: &str, message_id: &str) -> Result<()>;

    async fn close(&self);
}

pub trait InboxConnector: Send + Sync {
    fn build(&self, config: &InboxConfig) -> Result<Arc<dyn InboxClient>>;
}
