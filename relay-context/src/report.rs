//! Operator usage report: tenant counts per plan, send volume and the
//! heaviest senders.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use relay_core::{DeliveryStatus, EmailLog, PlanTier, RelayResult, Tenant};
use serde::Serialize;
use tracing::instrument;

use crate::timeout::with_upstream_timeout;
use crate::RelayContext;

/// Activity entries scanned for the trailing-day figures.
const ACTIVITY_SCAN_LIMIT: usize = 1000;
const TOP_SENDERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub generated_at: DateTime<Utc>,
    pub users: UserCounts,
    pub emails: EmailCounts,
    pub top_senders: Vec<TopSender>,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserCounts {
    pub total: usize,
    pub free: usize,
    pub premium: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailCounts {
    /// Lifetime sends summed over every tenant.
    pub total_sent: u64,
    pub sent_this_month: u64,
    /// Send attempts logged in the trailing 24 hours.
    pub last_24_hours: usize,
    /// Percentage of those attempts that were accepted; 100 when idle.
    pub success_rate: f64,
    pub avg_response_ms: u64,
}

/// A heavy sender, without its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSender {
    pub plan: PlanTier,
    pub emails_sent_this_month: u64,
    pub total_emails_sent: u64,
}

impl UsageReport {
    pub fn build(
        tenants: &[Tenant],
        recent: &[EmailLog],
        generated_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let premium = tenants
            .iter()
            .filter(|t| t.plan == PlanTier::Premium)
            .count();

        let accepted = recent
            .iter()
            .filter(|e| e.status == DeliveryStatus::Sent)
            .count();
        let (success_rate, avg_response_ms) = if recent.is_empty() {
            (100.0, 0)
        } else {
            let total_ms: u64 = recent.iter().map(|e| e.response_time_ms).sum();
            (
                accepted as f64 * 100.0 / recent.len() as f64,
                total_ms / recent.len() as u64,
            )
        };

        let mut ranked: Vec<&Tenant> = tenants.iter().collect();
        ranked.sort_by(|a, b| b.total_emails_sent.cmp(&a.total_emails_sent));
        let top_senders = ranked
            .into_iter()
            .take(TOP_SENDERS)
            .map(|t| TopSender {
                plan: t.plan,
                emails_sent_this_month: t.emails_sent_this_month,
                total_emails_sent: t.total_emails_sent,
            })
            .collect();

        Self {
            generated_at,
            users: UserCounts {
                total: tenants.len(),
                free: tenants.len() - premium,
                premium,
            },
            emails: EmailCounts {
                total_sent: tenants.iter().map(|t| t.total_emails_sent).sum(),
                sent_this_month: tenants.iter().map(|t| t.emails_sent_this_month).sum(),
                last_24_hours: recent.len(),
                success_rate,
                avg_response_ms,
            },
            top_senders,
            uptime_secs: (generated_at - started_at).num_seconds().max(0),
        }
    }
}

impl RelayContext {
    /// Aggregate usage straight from the store; nothing here is cached.
    #[instrument(skip(self))]
    pub async fn usage_report(&self) -> RelayResult<UsageReport> {
        let store = self.store()?;
        let after = self.settings().upstream_timeout;
        let now = self.clock().now();

        let tenants = with_upstream_timeout("tenant listing", after, store.list_tenants()).await?;
        let recent = with_upstream_timeout(
            "activity log",
            after,
            store.email_logs_since(now - ChronoDuration::hours(24), ACTIVITY_SCAN_LIMIT),
        )
        .await?;

        Ok(UsageReport::build(&tenants, &recent, now, self.started_at()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::TenantId;

    fn tenant(id: &str, plan: PlanTier, month: u64, total: u64) -> Tenant {
        let mut t = Tenant::new(id, plan);
        t.emails_sent_this_month = month;
        t.total_emails_sent = total;
        t
    }

    fn log(status: DeliveryStatus, ms: u64, at: DateTime<Utc>) -> EmailLog {
        EmailLog {
            tenant_id: TenantId::new("t1"),
            to: "r@example.com".into(),
            status,
            response_time_ms: ms,
            at,
        }
    }

    #[test]
    fn aggregates_plans_volume_and_activity() {
        let now = Utc::now();
        let tenants = [
            tenant("t1", PlanTier::Free, 3, 40),
            tenant("t2", PlanTier::Premium, 10, 900),
            tenant("t3", PlanTier::Free, 0, 2),
        ];
        let recent = [
            log(DeliveryStatus::Sent, 100, now),
            log(DeliveryStatus::Sent, 200, now),
            log(DeliveryStatus::Failed, 300, now),
            log(DeliveryStatus::Sent, 400, now),
        ];

        let report = UsageReport::build(&tenants, &recent, now, now - ChronoDuration::seconds(90));

        assert_eq!(report.users, UserCounts { total: 3, free: 2, premium: 1 });
        assert_eq!(report.emails.total_sent, 942);
        assert_eq!(report.emails.sent_this_month, 13);
        assert_eq!(report.emails.last_24_hours, 4);
        assert_eq!(report.emails.success_rate, 75.0);
        assert_eq!(report.emails.avg_response_ms, 250);
        assert_eq!(report.top_senders[0].total_emails_sent, 900);
        assert_eq!(report.top_senders[2].plan, PlanTier::Free);
        assert_eq!(report.uptime_secs, 90);
    }

    #[test]
    fn idle_relay_reports_full_success() {
        let now = Utc::now();
        let report = UsageReport::build(&[], &[], now, now);

        assert_eq!(report.users.total, 0);
        assert_eq!(report.emails.success_rate, 100.0);
        assert_eq!(report.emails.avg_response_ms, 0);
        assert!(report.top_senders.is_empty());
    }
}
