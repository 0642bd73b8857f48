use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use relay_context::with_upstream_timeout;
use relay_core::RelayError;
use serde_json::{json, Value};
use tracing::warn;

use super::performance;
use crate::RelayState;

pub async fn health(State(state): State<RelayState>) -> (StatusCode, Json<Value>) {
    let started = Instant::now();
    let ctx = &state.ctx;

    let ping = match ctx.store() {
        Ok(store) => {
            with_upstream_timeout("ping", ctx.settings().upstream_timeout, async {
                store.ping().await.map_err(RelayError::store)
            })
            .await
        }
        Err(e) => Err(e),
    };
    let db_time = started.elapsed().as_millis();

    let database = match &ping {
        Ok(()) => json!({ "status": "connected", "responseTime": format!("{db_time}ms") }),
        Err(e) => {
            warn!("health check store ping failed: {}", e);
            json!({
                "status": "error",
                "responseTime": format!("{db_time}ms"),
                "error": e.to_string(),
            })
        }
    };

    let requests = state.metrics.requests();
    let errors = state.metrics.errors();
    let error_rate = if requests == 0 {
        0.0
    } else {
        errors as f64 * 100.0 / requests as f64
    };
    let now = ctx.clock().now();

    let (status, label) = if ping.is_ok() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = json!({
        "status": label,
        "timestamp": now,
        "uptime": (now - ctx.started_at()).num_seconds().max(0),
        "database": database,
        "metrics": {
            "totalRequests": requests,
            "totalErrors": errors,
            "errorRate": format!("{error_rate:.2}%"),
        },
        "cache": ctx.cache().stats(),
        "rateWindows": ctx.admission().windows().stats(),
        "pools": {
            "outbound": ctx.pools().outbound_len(),
            "inbox": ctx.pools().inbox_len(),
        },
        "performance": performance(started),
    });
    (status, Json(body))
}
