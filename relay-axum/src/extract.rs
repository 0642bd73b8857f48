use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use relay_core::{RelayError, TenantId};

use crate::{RelayAxumError, RelayState};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Tenant identifier taken from the `x-api-key` header.
#[derive(Debug, Clone)]
pub struct ApiKey(pub TenantId);

impl<S> FromRequestParts<S> for ApiKey
where
    S: Send + Sync,
{
    type Rejection = RelayAxumError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| ApiKey(TenantId::new(v)))
            .ok_or(RelayAxumError::Relay(RelayError::MissingApiKey))
    }
}

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Proof that the request carried the configured `x-admin-key`.
///
/// With no admin key configured every request is rejected.
#[derive(Debug, Clone, Copy)]
pub struct AdminKey;

impl FromRequestParts<RelayState> for AdminKey {
    type Rejection = RelayAxumError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &RelayState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        match (state.ctx.settings().admin_key.as_deref(), presented) {
            (Some(expected), Some(presented)) if expected == presented => Ok(AdminKey),
            _ => Err(RelayAxumError::Relay(RelayError::AdminKeyRejected)),
        }
    }
}
