// Consul HTTP API constants

use std::time::Duration;

pub mod consul_api_path {
    pub const KV: &str = "/v1/kv";
    pub const SESSION_CREATE: &str = "/v1/session/create";
    pub const SESSION_RENEW: &str = "/v1/session/renew";
}

/// Header carrying the ACL token
pub const TOKEN_HEADER: &str = "X-Consul-Token";

pub const DEFAULT_CONSUL_ADDRESS: &str = "http://127.0.0.1:8500";

/// Session TTL range accepted by Consul agents
pub const CONSUL_SESSION_TTL_MIN: Duration = Duration::from_secs(10);
pub const CONSUL_SESSION_TTL_MAX: Duration = Duration::from_secs(86400);
