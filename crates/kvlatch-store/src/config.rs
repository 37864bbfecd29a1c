// Configuration for ConsulKvClient

use crate::constants::DEFAULT_CONSUL_ADDRESS;

/// Configuration for the Consul HTTP client
#[derive(Clone, Debug)]
pub struct ConsulClientConfig {
    /// Agent address (e.g. "http://127.0.0.1:8500")
    pub address: String,
    /// ACL token sent with every request
    pub token: Option<String>,
    /// Datacenter to target; the agent's own when unset
    pub datacenter: Option<String>,
    /// Connection timeout in milliseconds (default: 5000)
    pub connect_timeout_ms: u64,
    /// Read timeout in milliseconds (default: 30000)
    pub read_timeout_ms: u64,
}

impl Default for ConsulClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_CONSUL_ADDRESS.to_string(),
            token: None,
            datacenter: None,
            connect_timeout_ms: 5000,
            read_timeout_ms: 30000,
        }
    }
}

impl ConsulClientConfig {
    /// Create a new config for a single agent address
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            ..Default::default()
        }
    }

    /// Set the ACL token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Set the datacenter
    pub fn with_datacenter(mut self, datacenter: &str) -> Self {
        self.datacenter = Some(datacenter.to_string());
        self
    }

    /// Set timeouts
    pub fn with_timeouts(mut self, connect_ms: u64, read_ms: u64) -> Self {
        self.connect_timeout_ms = connect_ms;
        self.read_timeout_ms = read_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ConsulClientConfig::default();
        assert_eq!(config.address, "http://127.0.0.1:8500");
        assert!(config.token.is_none());
        assert!(config.datacenter.is_none());
        assert_eq!(config.connect_timeout_ms, 5000);
        assert_eq!(config.read_timeout_ms, 30000);
    }

    #[test]
    fn test_config_builder() {
        let config = ConsulClientConfig::new("http://consul:8500")
            .with_token("secret")
            .with_datacenter("dc2")
            .with_timeouts(1000, 2000);

        assert_eq!(config.address, "http://consul:8500");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.datacenter.as_deref(), Some("dc2"));
        assert_eq!(config.connect_timeout_ms, 1000);
        assert_eq!(config.read_timeout_ms, 2000);
    }
}
