//! relay-context: the explicit per-process context every request path
//! goes through.
//!
//! A [`RelayContext`] owns the shared response cache, the admission
//! controller, the connection pools and the invalidation bridge. Build one
//! with [`RelayContextBuilder`] at startup, share it as `Arc<RelayContext>`
//! and call [`RelayContext::shutdown`] on the way out.

pub mod context;
pub mod invalidation;
pub mod keys;
pub mod operations;
pub mod report;
pub mod timeout;

pub use context::{CachedValue, RelayContext, RelayContextBuilder};
pub use invalidation::{InvalidationBridge, MutationKind};
pub use keys::{listing_key, listing_prefix, profile_key};
pub use operations::{EmailDraft, Listing, SendOutcome};
pub use report::{EmailCounts, TopSender, UsageReport, UserCounts};
pub use timeout::{with_upstream_timeout, IntoRelayError};
