use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use tracing::instrument;

use crate::extract::AdminKey;
use crate::{RelayAxumError, RelayState};

/// Usage report for operators. Cacheable by the caller for a minute.
#[instrument(skip_all)]
pub async fn metrics(
    _admin: AdminKey,
    State(state): State<RelayState>,
) -> Result<impl IntoResponse, RelayAxumError> {
    let report = state.ctx.usage_report().await?;
    Ok(([(header::CACHE_CONTROL, "private, max-age=60")], Json(report)))
}
