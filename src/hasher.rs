//! Password Hasher (C1).
//!
//! Verifies and produces memory-hard password hashes, and transparently
//! detects legacy bcrypt hashes so the orchestrator can upgrade them on
//! successful verification.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use thiserror::Error;

use crate::config::Config;

const SALT_LEN_BYTES: usize = 32;
const OUTPUT_LEN_BYTES: usize = 64;
const MIN_MEMORY_KIB: u32 = 65536;
const MIN_TIME_COST: u32 = 3;
const MIN_PARALLELISM: u32 = 4;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("hashing failed: {0}")]
    Hashing(String),

    /// Memory/time parameters below the configured floor — an
    /// operator-visible error rather than a silent weakening (spec §4.1).
    #[error("hasher parameters below floor: {0}")]
    WeakParameters(String),
}

impl From<HashError> for crate::error::Error {
    fn from(e: HashError) -> Self {
        match e {
            HashError::WeakParameters(msg) => crate::error::Error::Internal(msg),
            HashError::Hashing(msg) => crate::error::Error::Internal(msg),
        }
    }
}

/// Result of [`PasswordHasher::verify`]. `matched == false` with
/// `needs_upgrade == false` also covers the "unknown algorithm tag" case —
/// the hasher fails closed rather than raising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub matched: bool,
    pub needs_upgrade: bool,
}

/// Hashes with Argon2id (primary) and verifies against either Argon2id or
/// legacy bcrypt.
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new(config: &Config) -> Result<Self, HashError> {
        if config.hash_memory_kib < MIN_MEMORY_KIB
            || config.hash_time_cost < MIN_TIME_COST
            || config.hash_parallelism < MIN_PARALLELISM
        {
            return Err(HashError::WeakParameters(format!(
                "memory_kib={} time_cost={} parallelism={}",
                config.hash_memory_kib, config.hash_time_cost, config.hash_parallelism
            )));
        }

        let params = Params::new(
            config.hash_memory_kib,
            config.hash_time_cost,
            config.hash_parallelism,
            Some(OUTPUT_LEN_BYTES),
        )
        .map_err(|e| HashError::Hashing(e.to_string()))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Produces a self-describing encoded hash (`$argon2id$v=19$m=…,t=…,p=…$salt$digest`).
    pub fn hash(&self, password: &str) -> Result<String, HashError> {
        let mut salt_bytes = [0u8; SALT_LEN_BYTES];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| HashError::Hashing(e.to_string()))?;

        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| HashError::Hashing(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verifies `password` against `encoded`. Unknown algorithm tags and
    /// malformed hashes fail closed (`matched = false`) instead of
    /// raising — only genuine operator misconfiguration raises.
    pub fn verify(&self, password: &str, encoded: &str) -> VerifyOutcome {
        if encoded.starts_with("$argon2") {
            return match PasswordHash::new(encoded) {
                Ok(parsed) => VerifyOutcome {
                    matched: self.argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
                    needs_upgrade: false,
                },
                Err(_) => VerifyOutcome { matched: false, needs_upgrade: false },
            };
        }

        if encoded.starts_with("$2") {
            let matched = bcrypt::verify(password, encoded).unwrap_or(false);
            return VerifyOutcome { matched, needs_upgrade: matched };
        }

        VerifyOutcome { matched: false, needs_upgrade: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            signing_secret: "x".repeat(32),
            access_ttl: std::time::Duration::from_secs(3600),
            refresh_ttl: std::time::Duration::from_secs(604_800),
            hash_memory_kib: MIN_MEMORY_KIB,
            hash_time_cost: MIN_TIME_COST,
            hash_parallelism: MIN_PARALLELISM,
            reset_ttl: std::time::Duration::from_secs(900),
            rate_limit_enabled: true,
            cors_allowed_origins: vec![],
            audit_log_enabled: true,
            production: false,
        }
    }

    #[test]
    fn hash_then_verify_matches() {
        let hasher = PasswordHasher::new(&test_config()).unwrap();
        let encoded = hasher.hash("P@ssw0rd!1").unwrap();
        assert!(encoded.starts_with("$argon2id$"));

        let outcome = hasher.verify("P@ssw0rd!1", &encoded);
        assert!(outcome.matched);
        assert!(!outcome.needs_upgrade);
    }

    #[test]
    fn wrong_password_does_not_match() {
        let hasher = PasswordHasher::new(&test_config()).unwrap();
        let encoded = hasher.hash("P@ssw0rd!1").unwrap();
        assert!(!hasher.verify("wrong", &encoded).matched);
    }

    #[test]
    fn legacy_bcrypt_verifies_and_flags_upgrade() {
        let hasher = PasswordHasher::new(&test_config()).unwrap();
        let legacy = bcrypt::hash("OldSecret#2", bcrypt::DEFAULT_COST).unwrap();

        let outcome = hasher.verify("OldSecret#2", &legacy);
        assert!(outcome.matched);
        assert!(outcome.needs_upgrade);
    }

    #[test]
    fn unknown_algorithm_tag_fails_closed() {
        let hasher = PasswordHasher::new(&test_config()).unwrap();
        let outcome = hasher.verify("anything", "md5$deadbeef");
        assert!(!outcome.matched);
        assert!(!outcome.needs_upgrade);
    }

    #[test]
    fn weak_parameters_rejected_at_construction() {
        let mut config = test_config();
        config.hash_memory_kib = 1024;
        assert!(matches!(PasswordHasher::new(&config), Err(HashError::WeakParameters(_))));
    }
}
