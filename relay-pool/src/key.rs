use std::fmt;

use relay_core::{InboxConfig, OutboundConfig};

/// Identity of a pooled upstream resource: host, port and the credential
/// it authenticates as. Passwords are deliberately not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    host: String,
    port: u16,
    identity: String,
}

impl PoolKey {
    pub fn new(host: impl Into<String>, port: u16, identity: impl Into<String>) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            port,
            identity: identity.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl From<&OutboundConfig> for PoolKey {
    fn from(cfg: &OutboundConfig) -> Self {
        PoolKey::new(cfg.host.as_str(), cfg.port, cfg.user.as_str())
    }
}

impl From<&InboxConfig> for PoolKey {
    fn from(cfg: &InboxConfig) -> Self {
        PoolKey::new(cfg.host.as_str(), cfg.port, cfg.user.as_str())
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.host, self.port, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound(host: &str, user: &str, password: &str) -> OutboundConfig {
        OutboundConfig {
            host: host.into(),
            port: 587,
            secure: false,
            user: user.into(),
            password: password.into(),
            from_name: None,
        }
    }

    #[test]
    fn key_ignores_password_and_host_case() {
        let a = PoolKey::from(&outbound("SMTP.example.com", "u", "one"));
        let b = PoolKey::from(&outbound("smtp.example.com", "u", "two"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "smtp.example.com_587_u");
    }

    #[test]
    fn identity_distinguishes_keys() {
        let a = PoolKey::from(&outbound("smtp.example.com", "alice", "p"));
        let b = PoolKey::from(&outbound("smtp.example.com", "bob", "p"));
        assert_ne!(a, b);
    }
}
