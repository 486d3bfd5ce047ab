//! Shared `Config` fixture for unit tests across components. Not part of
//! the public API.

#![cfg(test)]

use std::time::Duration;

use crate::config::Config;

pub fn test_config() -> Config {
    Config {
        signing_secret: "test-signing-secret-needs-32-bytes!".to_string(),
        access_ttl: Duration::from_secs(3600),
        refresh_ttl: Duration::from_secs(604_800),
        hash_memory_kib: 65536,
        hash_time_cost: 3,
        hash_parallelism: 4,
        reset_ttl: Duration::from_secs(900),
        rate_limit_enabled: true,
        cors_allowed_origins: vec![],
        audit_log_enabled: true,
        production: false,
    }
}
