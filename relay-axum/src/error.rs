use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use relay_admission::Denial;
use relay_core::{ErrorKind, RelayError};
use serde_json::{json, Value};

/// Anything a handler can fail with, rendered as a Feathers-style body:
/// `{ name, message, code, className, data? }`.
#[derive(Debug)]
pub enum RelayAxumError {
    Relay(RelayError),
    /// Admission refused. Rendered as 429 with `Retry-After`.
    Denied(Denial),
}

impl From<RelayError> for RelayAxumError {
    fn from(e: RelayError) -> Self {
        Self::Relay(e)
    }
}

impl From<Denial> for RelayAxumError {
    fn from(d: Denial) -> Self {
        Self::Denied(d)
    }
}

impl RelayAxumError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::Relay(RelayError::BadRequest(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        let code = match self {
            RelayAxumError::Relay(e) => e.code(),
            RelayAxumError::Denied(_) => ErrorKind::TooManyRequests.status_code(),
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn to_json(&self) -> Value {
        let (kind, message, data) = match self {
            RelayAxumError::Relay(e) => {
                let data = match e {
                    RelayError::MonthlyQuotaExceeded { limit } => Some(json!({ "limit": limit })),
                    RelayError::UpstreamTimeout { operation, after } => Some(json!({
                        "operation": operation,
                        "timeoutSecs": after.as_secs(),
                    })),
                    _ => None,
                };
                (e.kind(), e.to_string(), data)
            }
            RelayAxumError::Denied(d) => (
                ErrorKind::TooManyRequests,
                d.reason.message().to_string(),
                Some(json!({ "retryAfter": d.retry_after, "reason": d.reason })),
            ),
        };

        let mut body = json!({
            "name": kind.name(),
            "message": message,
            "code": kind.status_code(),
            "className": kind.class_name(),
        });
        if let Some(data) = data {
            body["data"] = data;
        }
        body
    }
}

impl IntoResponse for RelayAxumError {
    fn into_response(self) -> Response {
        let mut res = (self.status(), Json(self.to_json())).into_response();
        if let RelayAxumError::Denied(d) = &self {
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(d.retry_after));
        }
        res
    }
}

pub(crate) fn map_json_rejection(rejection: JsonRejection) -> RelayAxumError {
    RelayAxumError::bad_request(format!(
        "Failed to parse the request body as JSON: {}",
        rejection.body_text()
    ))
}

pub(crate) fn map_query_rejection(rejection: QueryRejection) -> RelayAxumError {
    RelayAxumError::bad_request(format!("Invalid query string: {}", rejection.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_admission::DenyReason;

    #[test]
    fn denial_renders_retry_hint() {
        let err = RelayAxumError::Denied(Denial {
            reason: DenyReason::HourlyRateExceeded,
            retry_after: 42,
        });
        let body = err.to_json();
        assert_eq!(body["name"], "TooManyRequests");
        assert_eq!(body["code"], 429);
        assert_eq!(body["data"]["retryAfter"], 42);
        assert_eq!(body["data"]["reason"], "hourly_rate_exceeded");

        let res = err.into_response();
        assert_eq!(res.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn relay_errors_use_their_kind() {
        let err = RelayAxumError::from(RelayError::NotConfigured("inbox"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let body = err.to_json();
        assert_eq!(body["className"], "bad-request");
        assert_eq!(body["message"], "inbox not configured for this tenant");
        assert!(body.get("data").is_none());
    }
}
