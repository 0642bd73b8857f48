//! In-memory upstreams for tests and the development server.
//!
//! `MemoryTransportFactory` records every message instead of relaying it;
//! `MemoryInboxConnector` serves mailboxes seeded through
//! [`MemoryInboxConnector::deliver`]. Both count how often they build a
//! client so pool reuse is observable.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::info;

use super::{
    InboxClient, InboxConnector, InboxMessage, InboxQuery, OutboundMessage, RelayTransport,
    SendReceipt, TransportFactory, TransportOptions,
};
use crate::tenant::{InboxConfig, OutboundConfig};

/// A message accepted by a [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub relay_host: String,
    pub relay_user: String,
    pub message: OutboundMessage,
}

#[derive(Default)]
struct OutboxState {
    sent: Mutex<Vec<SentMessage>>,
    builds: AtomicUsize,
    closed: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    fail_sends: AtomicBool,
    send_delay: Mutex<Option<Duration>>,
    rejected_hosts: RwLock<HashSet<String>>,
    options_seen: Mutex<Vec<TransportOptions>>,
}

#[derive(Clone, Default)]
pub struct MemoryTransportFactory {
    state: Arc<OutboxState>,
}

impl MemoryTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds for this host fail, as a misconfigured relay would.
    pub fn reject_host(&self, host: &str) {
        self.state.rejected_hosts.write().insert(host.to_string());
    }

    pub fn accept_host(&self, host: &str) {
        self.state.rejected_hosts.write().remove(host);
    }

    /// Make every subsequent send fail with a relay-style error.
    pub fn fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Hold every send for `delay` before answering.
    pub fn delay_sends(&self, delay: Option<Duration>) {
        *self.state.send_delay.lock() = delay;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.sent.lock().clone()
    }

    pub fn builds(&self) -> usize {
        self.state.builds.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Options handed to each successful build, in build order.
    pub fn options_seen(&self) -> Vec<TransportOptions> {
        self.state.options_seen.lock().clone()
    }

    /// Highest number of sends observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn build(
        &self,
        config: &OutboundConfig,
        options: &TransportOptions,
    ) -> Result<Arc<dyn RelayTransport>> {
        if self.state.rejected_hosts.read().contains(&config.host) {
            bail!("cannot resolve relay host {}", config.host);
        }
        self.state.builds.fetch_add(1, Ordering::SeqCst);
        self.state.options_seen.lock().push(options.clone());
        Ok(Arc::new(MemoryTransport {
            state: Arc::clone(&self.state),
            relay_host: config.host.clone(),
            relay_user: config.user.clone(),
        }))
    }
}

pub struct MemoryTransport {
    state: Arc<OutboxState>,
    relay_host: String,
    relay_user: String,
}

#[async_trait]
impl RelayTransport for MemoryTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt> {
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.state.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.state.fail_sends.load(Ordering::SeqCst) {
            bail!("550 relay rejected message for {}", message.to);
        }

        let mut sent = self.state.sent.lock();
        sent.push(SentMessage {
            relay_host: self.relay_host.clone(),
            relay_user: self.relay_user.clone(),
            message: message.clone(),
        });
        let message_id = format!("<{}.{}@{}>", sent.len(), self.relay_user, self.relay_host);

        info!(to = %message.to, relay = %self.relay_host, "message accepted by memory relay");
        Ok(SendReceipt { message_id })
    }

    async fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

type Mailboxes = HashMap<(String, String), Vec<InboxMessage>>;

#[derive(Default)]
struct InboxState {
    mailboxes: RwLock<Mailboxes>,
    builds: AtomicUsize,
    list_calls: AtomicUsize,
    closed: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryInboxConnector {
    state: Arc<InboxState>,
}

impl MemoryInboxConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a message into `user`'s `mailbox`.
    pub fn deliver(&self, user: &str, mailbox: &str, message: InboxMessage) {
        self.state
            .mailboxes
            .write()
            .entry((user.to_string(), mailbox.to_string()))
            .or_default()
            .push(message);
    }

    pub fn builds(&self) -> usize {
        self.state.builds.load(Ordering::SeqCst)
    }

    /// Upstream list round-trips served so far.
    pub fn list_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl InboxConnector for MemoryInboxConnector {
    fn build(&self, config: &InboxConfig) -> Result<Arc<dyn InboxClient>> {
        if !config.is_complete() {
            bail!("inbox configuration for {} is incomplete", config.host);
        }
        self.state.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryInbox {
            state: Arc::clone(&self.state),
            user: config.user.clone(),
        }))
    }
}

pub struct MemoryInbox {
    state: Arc<InboxState>,
    user: String,
}

#[async_trait]
impl InboxClient for MemoryInbox {
    async fn list(&self, query: &InboxQuery) -> Result<Vec<InboxMessage>> {
        self.state.list_calls.fetch_add(1, Ordering::SeqCst);

        let mailboxes = self.state.mailboxes.read();
        let messages = mailboxes
            .get(&(self.user.clone(), query.mailbox.clone()))
            .map(|msgs| {
                msgs.iter()
                    .rev()
                    .filter(|m| !query.unread_only || !m.seen)
                    .take(query.limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(messages)
    }

    async fn mark_read(&self, mailbox: &str, message_id: &str) -> Result<()> {
        let mut mailboxes = self.state.mailboxes.write();
        let message = mailboxes
            .get_mut(&(self.user.clone(), mailbox.to_string()))
            .and_then(|msgs| msgs.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| anyhow!("message {message_id} not found in {mailbox}"))?;
        message.seen = true;
        Ok(())
    }

    async fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbox_config() -> InboxConfig {
        InboxConfig {
            host: "imap.example.com".into(),
            port: 993,
            secure: true,
            user: "reader".into(),
            password: "pw".into(),
        }
    }

    fn message(id: &str, seen: bool) -> InboxMessage {
        InboxMessage {
            id: id.into(),
            from: "a@example.com".into(),
            subject: format!("subject {id}"),
            date: "2026-01-01T00:00:00Z".into(),
            seen,
            preview: None,
        }
    }

    #[tokio::test]
    async fn list_filters_unread_and_applies_limit_newest_first() {
        let connector = MemoryInboxConnector::new();
        connector.deliver("reader", "INBOX", message("1", false));
        connector.deliver("reader", "INBOX", message("2", true));
        connector.deliver("reader", "INBOX", message("3", false));

        let client = connector.build(&inbox_config()).unwrap();
        let unread = client
            .list(&InboxQuery {
                mailbox: "INBOX".into(),
                limit: 1,
                unread_only: true,
            })
            .await
            .unwrap();

        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "3");
    }

    #[tokio::test]
    async fn mark_read_flags_the_message() {
        let connector = MemoryInboxConnector::new();
        connector.deliver("reader", "INBOX", message("1", false));
        let client = connector.build(&inbox_config()).unwrap();

        client.mark_read("INBOX", "1").await.unwrap();
        assert!(client.mark_read("INBOX", "missing").await.is_err());

        let all = client.list(&InboxQuery::default()).await.unwrap();
        assert!(all[0].seen);
    }

    #[tokio::test]
    async fn failing_relay_reports_cause() {
        let factory = MemoryTransportFactory::new();
        let cfg = OutboundConfig {
            host: "smtp.example.com".into(),
            port: 587,
            secure: false,
            user: "u".into(),
            password: "p".into(),
            from_name: None,
        };
        let transport = factory.build(&cfg, &TransportOptions::default()).unwrap();
        factory.fail_sends(true);

        let err = transport
            .send(&OutboundMessage {
                from: "u".into(),
                to: "x@example.com".into(),
                subject: "s".into(),
                html: "<p>h</p>".into(),
                attachments: vec![],
            })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("550"));
        assert!(factory.sent().is_empty());
    }
}
