//! Upstream operations run on behalf of an admitted tenant.
//!
//! Callers hold an admission permit for the duration of each call; these
//! methods never admit or release themselves.

use std::sync::Arc;

use relay_core::{
    Attachment, DeliveryStatus, EmailLog, InboxMessage, InboxQuery, OutboundMessage, RelayError,
    RelayResult, SendReceipt, Tenant,
};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::keys::listing_key;
use crate::timeout::with_upstream_timeout;
use crate::{CachedValue, MutationKind, RelayContext};

/// An email as submitted by the tenant, before the sender is filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDraft {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub receipt: SendReceipt,
    /// Monthly count including this email, as far as the cached profile
    /// knows.
    pub emails_sent: u64,
}

/// One inbox page and whether it came from the cache.
#[derive(Debug, Clone)]
pub struct Listing {
    pub messages: Arc<Vec<InboxMessage>>,
    pub cached: bool,
}

impl RelayContext {
    /// Relay `draft` through the tenant's pooled outbound transport.
    ///
    /// Checks the monthly allowance first. Every attempt that reaches the
    /// relay is appended to the activity log; on success the persisted
    /// counters are bumped too. Both writes run in the background.
    #[instrument(skip(self, tenant, draft), fields(tenant_id = %tenant.id, to = %draft.to))]
    pub async fn send_email(&self, tenant: &Tenant, draft: EmailDraft) -> RelayResult<SendOutcome> {
        self.admission().monthly_quota(tenant).ensure_available()?;

        let outbound = tenant
            .outbound
            .as_ref()
            .ok_or(RelayError::NotConfigured("outbound relay"))?;
        let transport = self.pools().acquire_outbound(outbound)?;

        let message = OutboundMessage {
            from: outbound.sender(),
            to: draft.to,
            subject: draft.subject,
            html: draft.html,
            attachments: draft.attachments,
        };
        let started = Instant::now();
        let sent = with_upstream_timeout(
            "send",
            self.settings().upstream_timeout,
            transport.send(&message),
        )
        .await;
        self.log_email_detached(EmailLog {
            tenant_id: tenant.id.clone(),
            to: message.to.clone(),
            status: if sent.is_ok() {
                DeliveryStatus::Sent
            } else {
                DeliveryStatus::Failed
            },
            response_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            at: self.clock().now(),
        });
        let receipt = sent?;

        info!(message_id = %receipt.message_id, "email relayed");
        self.record_send_detached(&tenant.id);

        Ok(SendOutcome {
            receipt,
            emails_sent: tenant.emails_sent_this_month + 1,
        })
    }

    /// Cache-aside inbox listing.
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id))]
    pub async fn list_messages(&self, tenant: &Tenant, query: &InboxQuery) -> RelayResult<Listing> {
        let inbox = tenant
            .inbox
            .as_ref()
            .filter(|cfg| cfg.is_complete())
            .ok_or(RelayError::NotConfigured("inbox"))?;

        let key = listing_key(&tenant.id, query);
        if let Some(cached) = self.cache().get(&key) {
            if let CachedValue::Listing(messages) = cached.as_ref() {
                debug!("listing served from cache");
                return Ok(Listing {
                    messages: Arc::clone(messages),
                    cached: true,
                });
            }
        }

        let client = self.pools().acquire_inbox(inbox)?;
        let messages = Arc::new(
            with_upstream_timeout("list", self.settings().upstream_timeout, client.list(query))
                .await?,
        );
        self.cache().set(
            key,
            CachedValue::Listing(Arc::clone(&messages)),
            self.settings().cache_ttl,
        );

        Ok(Listing {
            messages,
            cached: false,
        })
    }

    /// Flag a message as read upstream and drop the mailbox's cached pages.
    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id))]
    pub async fn mark_read(&self, tenant: &Tenant, mailbox: &str, message_id: &str) -> RelayResult<()> {
        let inbox = tenant
            .inbox
            .as_ref()
            .filter(|cfg| cfg.is_complete())
            .ok_or(RelayError::NotConfigured("inbox"))?;

        let client = self.pools().acquire_inbox(inbox)?;
        with_upstream_timeout(
            "mark read",
            self.settings().upstream_timeout,
            client.mark_read(mailbox, message_id),
        )
        .await?;

        let changed = MutationKind::MessagesChanged {
            mailbox: Some(mailbox.to_string()),
        };
        self.invalidation().on_mutation(&tenant.id, &changed);
        self.record_read_detached(&tenant.id);
        Ok(())
    }
}
