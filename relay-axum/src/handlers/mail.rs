use std::time::Instant;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use relay_context::EmailDraft;
use relay_core::{Attachment, InboxQuery, PlanTier};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::performance;
use crate::error::{map_json_rejection, map_query_rejection};
use crate::extract::ApiKey;
use crate::{RelayAxumError, RelayState};

const MAX_LISTING: usize = 500;

#[derive(Debug, Deserialize)]
pub struct SendEmailBody {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

pub async fn send_email(
    State(state): State<RelayState>,
    ApiKey(id): ApiKey,
    body: Result<Json<SendEmailBody>, JsonRejection>,
) -> Result<Json<Value>, RelayAxumError> {
    let started = Instant::now();
    let Json(body) = body.map_err(map_json_rejection)?;
    if body.to.trim().is_empty() || body.subject.trim().is_empty() || body.html.is_empty() {
        return Err(RelayAxumError::bad_request(
            "Missing required fields: to, subject, html",
        ));
    }

    let tenant = state.ctx.resolve_tenant(&id).await?;
    let _permit = state.ctx.admission().acquire(&tenant.id, tenant.plan)?;

    let outcome = state
        .ctx
        .send_email(
            &tenant,
            EmailDraft {
                to: body.to,
                subject: body.subject,
                html: body.html,
                attachments: body.attachments,
            },
        )
        .await?;

    let emails_sent = match tenant.plan {
        PlanTier::Premium => json!("unlimited"),
        PlanTier::Free => json!(outcome.emails_sent),
    };
    Ok(Json(json!({
        "success": true,
        "message": "Email sent successfully",
        "messageId": outcome.receipt.message_id,
        "user": {
            "id": tenant.id,
            "email": tenant.email,
            "plan": tenant.plan,
            "emails_sent": emails_sent,
        },
        "performance": performance(started),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ReadMessagesParams {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default, rename = "unreadOnly")]
    pub unread_only: bool,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
}

fn default_limit() -> usize {
    50
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

pub async fn read_messages(
    State(state): State<RelayState>,
    ApiKey(id): ApiKey,
    params: Result<Query<ReadMessagesParams>, QueryRejection>,
) -> Result<Json<Value>, RelayAxumError> {
    let started = Instant::now();
    let Query(params) = params.map_err(map_query_rejection)?;
    let query = InboxQuery {
        mailbox: params.mailbox,
        limit: params.limit.clamp(1, MAX_LISTING),
        unread_only: params.unread_only,
    };

    let tenant = state.ctx.resolve_tenant(&id).await?;
    if !tenant.inbox.as_ref().is_some_and(|cfg| cfg.is_complete()) {
        return Err(relay_core::RelayError::NotConfigured("inbox").into());
    }
    let _permit = state.ctx.admission().acquire(&tenant.id, tenant.plan)?;

    let listing = state.ctx.list_messages(&tenant, &query).await?;
    debug!(count = listing.messages.len(), cached = listing.cached, "listing served");

    Ok(Json(json!({
        "success": true,
        "messages": listing.messages.as_ref(),
        "count": listing.messages.len(),
        "mailbox": query.mailbox,
        "cached": listing.cached,
        "performance": performance(started),
    })))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadBody {
    #[serde(default, rename = "messageId")]
    pub message_id: String,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
}

pub async fn mark_read(
    State(state): State<RelayState>,
    ApiKey(id): ApiKey,
    body: Result<Json<MarkReadBody>, JsonRejection>,
) -> Result<Json<Value>, RelayAxumError> {
    let started = Instant::now();
    let Json(body) = body.map_err(map_json_rejection)?;
    if body.message_id.trim().is_empty() {
        return Err(RelayAxumError::bad_request("Missing messageId"));
    }

    let tenant = state.ctx.resolve_tenant(&id).await?;
    let _permit = state.ctx.admission().acquire(&tenant.id, tenant.plan)?;

    state
        .ctx
        .mark_read(&tenant, &body.mailbox, &body.message_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Message marked as read",
        "messageId": body.message_id,
        "performance": performance(started),
    })))
}
