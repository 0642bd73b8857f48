//! relay-admission: decides whether a tenant's request may start.
//!
//! Two gates, checked in order: the tenant's in-flight concurrency cap,
//! then its hourly request quota. Denials change nothing. An admitted
//! request consumes one unit of hourly quota for good and holds one
//! concurrency slot until released.
//!
//! The monthly email quota is separate and is checked against the
//! tenant's persisted counter, see [`check_monthly_quota`].

pub mod controller;
pub mod decision;
pub mod monthly;

pub use controller::{AdmissionController, AdmissionPermit};
pub use decision::{AdmissionDecision, Denial, DenyReason};
pub use monthly::{check_monthly_quota, MonthlyQuota};
