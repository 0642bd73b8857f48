//! # Relay Configuration
//!
//! A minimal string key/value store, layered the same way at every entry
//! point: defaults, then environment, then explicit `set` calls.
//!
//! ```rust
//! use relay_core::RelayConfig;
//!
//! let mut cfg = RelayConfig::new();
//! cfg.set("cache.ttl_secs", "120");
//! assert_eq!(cfg.get("cache.ttl_secs"), Some("120"));
//! ```
//!
//! ## Environment overrides
//!
//! `RelayConfig::load_env("RELAY__")` maps variables onto dotted keys:
//!
//! ```bash
//! export RELAY__CACHE__TTL_SECS=60          # cache.ttl_secs
//! export RELAY__PLANS__FREE__REQUESTS_PER_HOUR=50
//! ```
//!
//! Typed values are read through [`RelaySettings::from_snapshot`], which
//! falls back to a default for every key that is absent or unparsable.

use std::collections::HashMap;
use std::time::Duration;

use crate::upstream::TransportOptions;

#[derive(Debug, Default)]
pub struct RelayConfig {
    values: HashMap<String, String>,
}

impl RelayConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Copy every `PREFIX…` environment variable into the store.
    ///
    /// `RELAY__HTTP__PORT` → `http.port`.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(prefix, std::env::vars());
    }

    pub fn load_vars<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                if !normalized.is_empty() {
                    self.set(normalized, value);
                }
            }
        }
    }

    pub fn snapshot(&self) -> RelayConfigSnapshot {
        RelayConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelayConfigSnapshot {
    map: HashMap<String, String>,
}

impl RelayConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse::<bool>().ok())
    }

    pub fn get_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_secs)
    }
}

/// Typed view over a config snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub http_host: String,
    pub http_port: u16,
    /// Default TTL for profile and listing entries.
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub rate_sweep_interval: Duration,
    pub upstream_timeout: Duration,
    pub pool_max_connections: usize,
    pub pool_max_messages: usize,
    pub pool_rate_limit: u32,
    pub pool_connection_timeout: Duration,
    pub pool_greeting_timeout: Duration,
    pub pool_socket_timeout: Duration,
    /// Key required in `x-admin-key` for the usage report. Unset means the
    /// report is never served.
    pub admin_key: Option<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            http_host: "127.0.0.1".to_string(),
            http_port: 3030,
            cache_ttl: Duration::from_secs(300),
            cache_sweep_interval: Duration::from_secs(60),
            rate_sweep_interval: Duration::from_secs(120),
            upstream_timeout: Duration::from_secs(30),
            pool_max_connections: 10,
            pool_max_messages: 100,
            pool_rate_limit: 50,
            pool_connection_timeout: Duration::from_secs(60),
            pool_greeting_timeout: Duration::from_secs(30),
            pool_socket_timeout: Duration::from_secs(60),
            admin_key: None,
        }
    }
}

impl RelaySettings {
    pub fn from_snapshot(snapshot: &RelayConfigSnapshot) -> Self {
        let d = Self::default();
        Self {
            http_host: snapshot.get_string("http.host").unwrap_or(d.http_host),
            http_port: snapshot
                .get("http.port")
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(d.http_port),
            cache_ttl: snapshot.get_secs("cache.ttl_secs").unwrap_or(d.cache_ttl),
            cache_sweep_interval: snapshot
                .get_secs("cache.sweep_secs")
                .unwrap_or(d.cache_sweep_interval),
            rate_sweep_interval: snapshot
                .get_secs("rate.sweep_secs")
                .unwrap_or(d.rate_sweep_interval),
            upstream_timeout: snapshot
                .get_secs("upstream.timeout_secs")
                .unwrap_or(d.upstream_timeout),
            pool_max_connections: snapshot
                .get_usize("pool.max_connections")
                .unwrap_or(d.pool_max_connections),
            pool_max_messages: snapshot
                .get_usize("pool.max_messages")
                .unwrap_or(d.pool_max_messages),
            pool_rate_limit: snapshot
                .get_u64("pool.rate_limit")
                .map(|v| v.min(u32::MAX as u64) as u32)
                .unwrap_or(d.pool_rate_limit),
            pool_connection_timeout: snapshot
                .get_secs("pool.connection_timeout_secs")
                .unwrap_or(d.pool_connection_timeout),
            pool_greeting_timeout: snapshot
                .get_secs("pool.greeting_timeout_secs")
                .unwrap_or(d.pool_greeting_timeout),
            pool_socket_timeout: snapshot
                .get_secs("pool.socket_timeout_secs")
                .unwrap_or(d.pool_socket_timeout),
            admin_key: snapshot.get_string("admin.key").filter(|k| !k.is_empty()),
        }
    }

    /// Limits every pooled outbound transport is built with.
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            max_connections: self.pool_max_connections,
            max_messages: self.pool_max_messages,
            rate_limit: self.pool_rate_limit,
            connection_timeout: self.pool_connection_timeout,
            greeting_timeout: self.pool_greeting_timeout,
            socket_timeout: self.pool_socket_timeout,
            ..TransportOptions::default()
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
