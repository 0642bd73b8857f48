use relay_core::{PlanLimits, RelayError, RelayResult, Tenant};

/// Where a tenant stands against its monthly email allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthlyQuota {
    Unlimited,
    Remaining(u64),
    Exhausted { limit: u64 },
}

impl MonthlyQuota {
    /// Turn an exhausted quota into `RelayError::MonthlyQuotaExceeded`.
    pub fn ensure_available(self) -> RelayResult<Self> {
        match self {
            MonthlyQuota::Exhausted { limit } => Err(RelayError::MonthlyQuotaExceeded { limit }),
            other => Ok(other),
        }
    }
}

/// Compare the tenant's persisted monthly counter with its plan.
pub fn check_monthly_quota(tenant: &Tenant, limits: &PlanLimits) -> MonthlyQuota {
    match limits.emails_per_month {
        None => MonthlyQuota::Unlimited,
        Some(limit) if tenant.emails_sent_this_month >= limit => MonthlyQuota::Exhausted { limit },
        Some(limit) => MonthlyQuota::Remaining(limit - tenant.emails_sent_this_month),
    }
}
