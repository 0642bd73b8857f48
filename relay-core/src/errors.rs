//! # Errors
//!
//! One taxonomy shared by every relay crate:
//! - `RelayError` is what operations return
//! - `ErrorKind` carries the Feathers-style status code, name and class
//!   name, so the HTTP layer can render any error without matching on it
//!
//! An admission denial is not an error; see `relay-admission`.

use std::time::Duration;

use thiserror::Error;

/// Convenience result type for relay operations.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Feathers-ish error class names + status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,         // 400
    NotAuthenticated,   // 401
    NotFound,           // 404
    Timeout,            // 408
    TooManyRequests,    // 429
    GeneralError,       // 500
    BadGateway,         // 502
    Unavailable,        // 503
    GatewayTimeout,     // 504
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotAuthenticated => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Timeout => 408,
            ErrorKind::TooManyRequests => 429,
            ErrorKind::GeneralError => 500,
            ErrorKind::BadGateway => 502,
            ErrorKind::Unavailable => 503,
            ErrorKind::GatewayTimeout => 504,
        }
    }

    /// Feathers error `name` (e.g. "NotFound")
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotAuthenticated => "NotAuthenticated",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::TooManyRequests => "TooManyRequests",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::BadGateway => "BadGateway",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::GatewayTimeout => "GatewayTimeout",
        }
    }

    /// Feathers error `className` (kebab-cased)
    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotAuthenticated => "not-authenticated",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::TooManyRequests => "too-many-requests",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::BadGateway => "bad-gateway",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::GatewayTimeout => "gateway-timeout",
        }
    }
}

/// Failures surfaced to the immediate caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// A pooled resource could not be built. Nothing was cached under its
    /// key, so a retry with corrected configuration can succeed.
    #[error("failed to construct pooled resource: {cause}")]
    PoolConstructionFailed { cause: String },

    /// The upstream did not answer in time. The operation may still
    /// complete server-side.
    #[error("upstream {operation} timed out after {}s", .after.as_secs())]
    UpstreamTimeout {
        operation: &'static str,
        after: Duration,
    },

    /// The upstream answered with a failure; `cause` is passed through
    /// verbatim.
    #[error("{cause}")]
    UpstreamFailure { cause: String },

    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("missing or invalid API key")]
    MissingApiKey,

    #[error("missing or invalid admin key")]
    AdminKeyRejected,

    #[error("{0} not configured for this tenant")]
    NotConfigured(&'static str),

    #[error("monthly email limit exceeded ({limit}/month)")]
    MonthlyQuotaExceeded { limit: u64 },

    #[error("metadata store error: {0}")]
    Store(String),

    #[error("{0}")]
    BadRequest(String),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::PoolConstructionFailed { .. } => ErrorKind::BadGateway,
            RelayError::UpstreamTimeout { .. } => ErrorKind::GatewayTimeout,
            RelayError::UpstreamFailure { .. } => ErrorKind::BadGateway,
            RelayError::TenantNotFound(_) => ErrorKind::NotFound,
            RelayError::MissingApiKey | RelayError::AdminKeyRejected => {
                ErrorKind::NotAuthenticated
            }
            RelayError::NotConfigured(_) => ErrorKind::BadRequest,
            RelayError::MonthlyQuotaExceeded { .. } => ErrorKind::TooManyRequests,
            RelayError::Store(_) => ErrorKind::Unavailable,
            RelayError::BadRequest(_) => ErrorKind::BadRequest,
        }
    }

    pub fn code(&self) -> u16 {
        self.kind().status_code()
    }

    pub fn pool_construction(err: impl std::fmt::Display) -> Self {
        Self::PoolConstructionFailed {
            cause: err.to_string(),
        }
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::UpstreamFailure {
            cause: err.to_string(),
        }
    }

    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayError::UpstreamTimeout { .. })
    }
}
