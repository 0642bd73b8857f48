//! relay-core: framework-agnostic core for the tenant relay gateway.
//!
//! Holds the tenant and plan model, the error taxonomy shared by every
//! crate, the key/value configuration store, the clock abstraction and the
//! trait seams for the metadata store and the upstream mail protocols.

pub mod clock;
pub mod config;
pub mod errors;
pub mod plan;
pub mod store;
pub mod tenant;
pub mod upstream;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RelayConfig, RelayConfigSnapshot, RelaySettings};
pub use errors::{ErrorKind, RelayError, RelayResult};
pub use plan::{LimitsTable, PlanLimits, PlanTier};
pub use store::{DeliveryStatus, EmailLog, MemoryStore, MetadataStore};
pub use tenant::{InboxConfig, OutboundConfig, Tenant, TenantId};
pub use upstream::{
    Attachment, InboxClient, InboxConnector, InboxMessage, InboxQuery, OutboundMessage,
    RelayTransport, SendReceipt, TransportFactory, TransportOptions,
};
