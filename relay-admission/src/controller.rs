use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_cache::TtlCache;
use relay_core::{Clock, LimitsTable, PlanLimits, PlanTier, SystemClock, Tenant, TenantId};
use tracing::{debug, info};

use crate::monthly::{check_monthly_quota, MonthlyQuota};
use crate::{AdmissionDecision, Denial, DenyReason};

const HOUR_MS: i64 = 3_600_000;

/// Rate windows outlive their hour by at most this much before the sweeper
/// may reclaim them.
const WINDOW_TTL: Duration = Duration::from_secs(3600);

/// Per-tenant admission state for the whole process.
///
/// `admit` checks both gates and bumps both counters while holding one
/// lock, so concurrent requests for the same tenant cannot both squeeze
/// through the last slot.
pub struct AdmissionController {
    limits: LimitsTable,
    clock: Arc<dyn Clock>,
    /// `rate:<tenant>:<hour-bucket>` → requests admitted in that hour.
    windows: Arc<TtlCache<u64>>,
    in_flight: Mutex<HashMap<TenantId, u32>>,
}

impl AdmissionController {
    pub fn new(limits: LimitsTable) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    pub fn with_clock(limits: LimitsTable, clock: Arc<dyn Clock>) -> Self {
        let windows = TtlCache::with_clock("rate-windows", Arc::clone(&clock))
            .with_default_ttl(WINDOW_TTL);
        Self {
            limits,
            clock,
            windows: Arc::new(windows),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn limits(&self, tier: PlanTier) -> PlanLimits {
        self.limits.get(tier)
    }

    /// Rate-window storage, for wiring up a sweeper.
    pub fn windows(&self) -> Arc<TtlCache<u64>> {
        Arc::clone(&self.windows)
    }

    /// Decide whether `tenant` may start one more request.
    ///
    /// On `Allowed` the caller owns one concurrency slot and must hand it
    /// back with [`release`](Self::release) exactly once, whatever the
    /// outcome of its work. Prefer [`acquire`](Self::acquire), which does
    /// that on drop.
    pub fn admit(&self, tenant: &TenantId, tier: PlanTier) -> AdmissionDecision {
        let limits = self.limits.get(tier);
        let now = self.clock.now();

        let mut in_flight = self.in_flight.lock();
        let current = in_flight.get(tenant).copied().unwrap_or(0);
        if current >= limits.concurrent_requests {
            info!(tenant_id = %tenant, current, "admission denied: concurrency cap");
            return AdmissionDecision::Denied(Denial {
                reason: DenyReason::TooManyConcurrent,
                retry_after: 1,
            });
        }

        let key = window_key(tenant, now);
        let used = self.windows.get(&key).map(|count| *count).unwrap_or(0);
        if used >= limits.requests_per_hour {
            info!(tenant_id = %tenant, used, "admission denied: hourly quota");
            return AdmissionDecision::Denied(Denial {
                reason: DenyReason::HourlyRateExceeded,
                retry_after: seconds_to_next_hour(now),
            });
        }

        self.windows.set(key, used + 1, WINDOW_TTL);
        in_flight.insert(tenant.clone(), current + 1);

        debug!(tenant_id = %tenant, in_flight = current + 1, hourly = used + 1, "admitted");
        AdmissionDecision::Allowed
    }

    /// Admit and wrap the slot in a guard that releases it when dropped.
    pub fn acquire(
        self: &Arc<Self>,
        tenant: &TenantId,
        tier: PlanTier,
    ) -> Result<AdmissionPermit, Denial> {
        match self.admit(tenant, tier) {
            AdmissionDecision::Allowed => Ok(AdmissionPermit {
                controller: Arc::clone(self),
                tenant: tenant.clone(),
                released: false,
            }),
            AdmissionDecision::Denied(denial) => Err(denial),
        }
    }

    /// Give back one concurrency slot. A no-op when the tenant holds none.
    pub fn release(&self, tenant: &TenantId) {
        let mut in_flight = self.in_flight.lock();
        match in_flight.get_mut(tenant) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                in_flight.remove(tenant);
            }
            None => debug!(tenant_id = %tenant, "release without matching admission ignored"),
        }
    }

    pub fn in_flight(&self, tenant: &TenantId) -> u32 {
        self.in_flight.lock().get(tenant).copied().unwrap_or(0)
    }

    /// Requests admitted for `tenant` in the current hour.
    pub fn hourly_count(&self, tenant: &TenantId) -> u64 {
        let key = window_key(tenant, self.clock.now());
        self.windows.get(&key).map(|count| *count).unwrap_or(0)
    }

    /// Monthly email allowance for a resolved tenant, per this controller's
    /// limits table.
    pub fn monthly_quota(&self, tenant: &Tenant) -> MonthlyQuota {
        check_monthly_quota(tenant, &self.limits.get(tenant.plan))
    }
}

/// One admitted unit of work. Dropping it releases the concurrency slot.
#[must_use = "dropping the permit releases the admission slot immediately"]
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
    tenant: TenantId,
    released: bool,
}

impl AdmissionPermit {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.controller.release(&self.tenant);
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.release_once();
    }
}

fn window_key(tenant: &TenantId, now: DateTime<Utc>) -> String {
    format!("rate:{}:{}", tenant, now.timestamp_millis().div_euclid(HOUR_MS))
}

/// Whole seconds until the next hour boundary, rounded up, at least 1.
fn seconds_to_next_hour(now: DateTime<Utc>) -> u64 {
    let remaining_ms = HOUR_MS - now.timestamp_millis().rem_euclid(HOUR_MS);
    ((remaining_ms + 999) / 1000).max(1) as u64
}
