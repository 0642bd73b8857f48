//! relay-pool: reuse of expensive upstream connections.
//!
//! Resources are keyed by their connection parameters (`PoolKey`), not by
//! tenant, so tenants sharing an upstream account share one resource.
//! There is at most one live resource per key; it lives until
//! [`PoolManager::drain_all`] at shutdown.

pub mod key;
pub mod keyed;
pub mod manager;
pub mod transport;

pub use key::PoolKey;
pub use keyed::KeyedPool;
pub use manager::PoolManager;
pub use transport::PooledTransport;
