use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::{RelayError, RelayResult};
use tracing::{debug, info};

use crate::PoolKey;

/// Lazily populated map of `PoolKey` → shared resource.
///
/// Construction runs under the pool lock, so two concurrent acquisitions
/// of a new key cannot both build. Builders are synchronous and must not
/// perform network I/O.
pub struct KeyedPool<T: ?Sized> {
    kind: &'static str,
    entries: Mutex<HashMap<PoolKey, Arc<T>>>,
}

impl<T: ?Sized> KeyedPool<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the resource for `key`, building it with `build` on first use.
    ///
    /// A failed build leaves the pool untouched and surfaces as
    /// `RelayError::PoolConstructionFailed`.
    pub fn get_or_try_insert_with<F>(&self, key: &PoolKey, build: F) -> RelayResult<Arc<T>>
    where
        F: FnOnce() -> anyhow::Result<Arc<T>>,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            debug!(pool = self.kind, %key, "reusing pooled resource");
            return Ok(Arc::clone(existing));
        }

        let resource = build().map_err(RelayError::pool_construction)?;
        entries.insert(key.clone(), Arc::clone(&resource));
        info!(pool = self.kind, %key, size = entries.len(), "created pooled resource");
        Ok(resource)
    }

    pub fn get(&self, key: &PoolKey) -> Option<Arc<T>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &PoolKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty the pool, handing back everything it held.
    pub fn drain(&self) -> Vec<(PoolKey, Arc<T>)> {
        self.entries.lock().drain().collect()
    }
}
