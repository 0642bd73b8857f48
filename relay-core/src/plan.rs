//! Plan tiers and their per-tier limits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::RelayConfigSnapshot;

/// Billing tier a tenant is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Premium,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "premium" => Ok(PlanTier::Premium),
            other => Err(format!("unknown plan tier: {other}")),
        }
    }
}

/// Quotas that apply to every tenant on a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub requests_per_hour: u64,
    /// `None` means unbounded.
    pub emails_per_month: Option<u64>,
    pub concurrent_requests: u32,
}

impl PlanLimits {
    pub const FREE: PlanLimits = PlanLimits {
        requests_per_hour: 100,
        emails_per_month: Some(3000),
        concurrent_requests: 5,
    };

    pub const PREMIUM: PlanLimits = PlanLimits {
        requests_per_hour: 1000,
        emails_per_month: None,
        concurrent_requests: 20,
    };

    pub fn for_tier(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Free => Self::FREE,
            PlanTier::Premium => Self::PREMIUM,
        }
    }
}

/// Tier → limits lookup, overridable from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitsTable {
    free: PlanLimits,
    premium: PlanLimits,
}

impl Default for LimitsTable {
    fn default() -> Self {
        Self {
            free: PlanLimits::FREE,
            premium: PlanLimits::PREMIUM,
        }
    }
}

impl LimitsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tier: PlanTier) -> PlanLimits {
        match tier {
            PlanTier::Free => self.free,
            PlanTier::Premium => self.premium,
        }
    }

    pub fn with_limits(mut self, tier: PlanTier, limits: PlanLimits) -> Self {
        match tier {
            PlanTier::Free => self.free = limits,
            PlanTier::Premium => self.premium = limits,
        }
        self
    }

    /// Apply `plans.<tier>.<field>` overrides on top of the defaults.
    ///
    /// `plans.<tier>.emails_per_month = unlimited` clears the monthly cap.
    pub fn from_snapshot(snapshot: &RelayConfigSnapshot) -> Self {
        let mut table = Self::default();
        for tier in [PlanTier::Free, PlanTier::Premium] {
            let mut limits = table.get(tier);
            let prefix = format!("plans.{}", tier.as_str());

            if let Some(v) = snapshot.get_u64(&format!("{prefix}.requests_per_hour")) {
                limits.requests_per_hour = v;
            }
            if let Some(v) = snapshot.get_u64(&format!("{prefix}.concurrent_requests")) {
                limits.concurrent_requests = v.min(u32::MAX as u64) as u32;
            }
            match snapshot.get(&format!("{prefix}.emails_per_month")) {
                Some("unlimited") => limits.emails_per_month = None,
                Some(raw) => {
                    if let Ok(v) = raw.parse::<u64>() {
                        limits.emails_per_month = Some(v);
                    }
                }
                None => {}
            }

            table = table.with_limits(tier, limits);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;

    #[test]
    fn defaults_match_published_plans() {
        let table = LimitsTable::default();
        assert_eq!(table.get(PlanTier::Free).requests_per_hour, 100);
        assert_eq!(table.get(PlanTier::Free).emails_per_month, Some(3000));
        assert_eq!(table.get(PlanTier::Free).concurrent_requests, 5);
        assert_eq!(table.get(PlanTier::Premium).emails_per_month, None);
        assert_eq!(table.get(PlanTier::Premium).concurrent_requests, 20);
    }

    #[test]
    fn snapshot_overrides_individual_fields() {
        let mut cfg = RelayConfig::new();
        cfg.set("plans.free.requests_per_hour", "10");
        cfg.set("plans.premium.emails_per_month", "5000");
        cfg.set("plans.free.emails_per_month", "unlimited");

        let table = LimitsTable::from_snapshot(&cfg.snapshot());
        assert_eq!(table.get(PlanTier::Free).requests_per_hour, 10);
        assert_eq!(table.get(PlanTier::Free).emails_per_month, None);
        assert_eq!(table.get(PlanTier::Free).concurrent_requests, 5);
        assert_eq!(table.get(PlanTier::Premium).emails_per_month, Some(5000));
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("Premium".parse::<PlanTier>(), Ok(PlanTier::Premium));
        assert!("gold".parse::<PlanTier>().is_err());
    }
}
