use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    TooManyConcurrent,
    HourlyRateExceeded,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::TooManyConcurrent => "too many concurrent requests",
            DenyReason::HourlyRateExceeded => "hourly rate limit exceeded",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A refused admission. Not an error: nothing was consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub reason: DenyReason,
    /// Seconds the caller should wait before retrying.
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (retry after {}s)", self.reason, self.retry_after)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allowed,
    Denied(Denial),
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed)
    }

    pub fn denial(&self) -> Option<Denial> {
        match self {
            AdmissionDecision::Allowed => None,
            AdmissionDecision::Denied(d) => Some(*d),
        }
    }
}
