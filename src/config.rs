//! Process-wide configuration, resolved once at boot and read-only
//! thereafter (spec §9 "Global mutable state").

use std::env;
use std::time::Duration;

use crate::error::Error;

const MIN_SIGNING_SECRET_BYTES: usize = 32;

/// Populated from environment variables via [`Config::from_env`]. A
/// signing secret shorter than [`MIN_SIGNING_SECRET_BYTES`] is a boot-time
/// `panic!` — the only process-fatal case this crate raises, per spec §9
/// "reserve process-fatal signaling for invariant violations only". Every
/// other malformed setting is a recoverable [`Error::Validation`].
#[derive(Clone)]
pub struct Config {
    pub signing_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub hash_memory_kib: u32,
    pub hash_time_cost: u32,
    pub hash_parallelism: u32,
    pub reset_ttl: Duration,
    pub rate_limit_enabled: bool,
    pub cors_allowed_origins: Vec<String>,
    pub audit_log_enabled: bool,
    /// Rejects wildcard CORS origins outside of this mode.
    pub production: bool,
}

impl Config {
    /// Reads every key in spec.md §6's configuration surface table,
    /// applying its documented default when absent.
    ///
    /// # Panics
    /// If `SIGNING_SECRET` is set but shorter than 32 bytes. This mirrors
    /// the teacher's own pattern of validating signing configuration at
    /// construction (`JwtManager::new` panics on a missing RSA/ECDSA key
    /// for the selected algorithm) — here the single HMAC secret is the
    /// one thing worth a hard boot failure.
    pub fn from_env() -> crate::error::Result<Self> {
        let signing_secret = env::var("SIGNING_SECRET").unwrap_or_default();
        if signing_secret.len() < MIN_SIGNING_SECRET_BYTES {
            panic!(
                "SIGNING_SECRET must be at least {} bytes, got {}",
                MIN_SIGNING_SECRET_BYTES,
                signing_secret.len()
            );
        }

        let access_ttl = Duration::from_secs(env_u64("ACCESS_TTL_SECONDS", 3600)?);
        let refresh_ttl = Duration::from_secs(env_u64("REFRESH_TTL_SECONDS", 604_800)?);
        let hash_memory_kib = env_u64("HASH_MEMORY_KIB", 65536)? as u32;
        let hash_time_cost = env_u64("HASH_TIME_COST", 3)? as u32;
        let hash_parallelism = env_u64("HASH_PARALLELISM", 4)? as u32;
        let reset_ttl = Duration::from_secs(env_u64("RESET_TTL_SECONDS", 900)?);
        let rate_limit_enabled = env_bool("RATE_LIMIT_ENABLED", true)?;
        let audit_log_enabled = env_bool("AUDIT_LOG_ENABLED", true)?;
        let production = env_bool("PRODUCTION", false)?;

        let cors_allowed_origins: Vec<String> = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if production && cors_allowed_origins.iter().any(|o| o == "*") {
            return Err(Error::Validation(
                "wildcard CORS_ALLOWED_ORIGINS rejected in production mode".into(),
            ));
        }

        // Memory/time parameters below the configured floor fail closed
        // with an operator-visible error rather than silently weakening
        // the hash (spec §4.1).
        if hash_memory_kib < 65536 || hash_time_cost < 3 || hash_parallelism < 4 {
            return Err(Error::Validation(format!(
                "hasher parameters below floor: memory_kib={hash_memory_kib} (min 65536), time_cost={hash_time_cost} (min 3), parallelism={hash_parallelism} (min 4)"
            )));
        }

        Ok(Self {
            signing_secret,
            access_ttl,
            refresh_ttl,
            hash_memory_kib,
            hash_time_cost,
            hash_parallelism,
            reset_ttl,
            rate_limit_enabled,
            cors_allowed_origins,
            audit_log_enabled,
            production,
        })
    }
}

fn env_u64(key: &str, default: u64) -> crate::error::Result<u64> {
    match env::var(key) {
        Ok(val) => val
            .parse()
            .map_err(|_| Error::Validation(format!("{key} must be a non-negative integer"))),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> crate::error::Result<bool> {
    match env::var(key) {
        Ok(val) => match val.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(Error::Validation(format!("{key} must be a boolean"))),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_u64_falls_back_to_default() {
        assert_eq!(env_u64("KEYSTONE_TEST_UNSET_KEY", 42).unwrap(), 42);
    }

    #[test]
    fn env_bool_rejects_garbage() {
        std::env::set_var("KEYSTONE_TEST_BOOL", "maybe");
        assert!(env_bool("KEYSTONE_TEST_BOOL", true).is_err());
        std::env::remove_var("KEYSTONE_TEST_BOOL");
    }
}
