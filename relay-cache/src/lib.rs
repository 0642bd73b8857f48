//! relay-cache: expiring key/value store shared by every request path.
//!
//! - values are held as `Arc<V>` and handed out without cloning
//! - expiry is checked on every read, so correctness never depends on the
//!   sweeper having run
//! - `prefix*` eviction walks an ordered key index, not the whole cache

pub mod cache;
pub mod error;
pub mod sweeper;

pub use cache::{CacheStats, TtlCache, DEFAULT_TTL};
pub use error::CacheError;
pub use sweeper::{Sweeper, SweeperHandle};
