use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::extract::ApiKey;
use crate::{RelayAxumError, RelayState};

/// Tenant profile and upstream settings. Passwords never leave the store:
/// the config types skip them when serializing.
pub async fn get_config(
    State(state): State<RelayState>,
    ApiKey(id): ApiKey,
) -> Result<Json<Value>, RelayAxumError> {
    let tenant = state.ctx.resolve_tenant(&id).await?;
    let limits = state.ctx.admission().limits(tenant.plan);

    Ok(Json(json!({
        "user": {
            "id": tenant.id,
            "email": tenant.email,
            "plan": tenant.plan,
            "emails_sent_this_month": tenant.emails_sent_this_month,
            "created_at": tenant.created_at,
        },
        "limits": {
            "requestsPerHour": limits.requests_per_hour,
            "emailsPerMonth": limits.emails_per_month,
            "concurrentRequests": limits.concurrent_requests,
        },
        "outbound": tenant.outbound,
        "inbox": tenant.inbox,
    })))
}
