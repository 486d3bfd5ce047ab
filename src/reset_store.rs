//! Reset Token Store (C7).
//!
//! Issues single-use password-reset tokens and guarantees that concurrent
//! `consume` calls on the same token yield exactly one success, matching
//! the session store's `dashmap`-backed, hash-indexed shape (spec §4.7).

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::model::ResetToken;

const TOKEN_LEN_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum ResetStoreError {
    #[error("reset token not found or already consumed")]
    Invalid,
}

impl From<ResetStoreError> for crate::error::Error {
    fn from(_: ResetStoreError) -> Self {
        // Never distinguish "not found" from "expired" from "already
        // consumed" to the caller — spec §4.7 treats all three alike to
        // avoid leaking which branch fired.
        crate::error::Error::Authentication
    }
}

fn hash_token(cleartext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cleartext.as_bytes());
    hex::encode(hasher.finalize())
}

/// In-memory reference implementation, keyed by the token's hash.
pub struct ResetTokenStore {
    by_hash: DashMap<String, ResetToken>,
}

impl ResetTokenStore {
    pub fn new() -> Self {
        Self { by_hash: DashMap::new() }
    }

    /// Returns the cleartext token exactly once, to be emailed to the
    /// user. Only its hash is retained.
    pub fn issue(&self, user_id: Uuid, ttl: ChronoDuration) -> String {
        let mut raw = [0u8; TOKEN_LEN_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let cleartext = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, raw);

        let token = ResetToken {
            token_hash: hash_token(&cleartext),
            user_id,
            expires_at: Utc::now() + ttl,
            consumed_at: None,
        };
        self.by_hash.insert(token.token_hash.clone(), token);
        cleartext
    }

    /// Atomically marks the token consumed. Exactly one concurrent caller
    /// observes `Ok`; every other caller (including a retry after success)
    /// observes `Err`.
    pub fn consume(&self, cleartext: &str) -> Result<Uuid, ResetStoreError> {
        let hash = hash_token(cleartext);
        let mut entry = self.by_hash.get_mut(&hash).ok_or(ResetStoreError::Invalid)?;

        if !entry.is_valid() {
            return Err(ResetStoreError::Invalid);
        }

        entry.consumed_at = Some(Utc::now());
        Ok(entry.user_id)
    }
}

impl Default for ResetTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn issue_then_consume_succeeds_once() {
        let store = ResetTokenStore::new();
        let user_id = Uuid::new_v4();
        let cleartext = store.issue(user_id, ChronoDuration::seconds(900));

        assert_eq!(store.consume(&cleartext).unwrap(), user_id);
        assert!(store.consume(&cleartext).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let store = ResetTokenStore::new();
        let user_id = Uuid::new_v4();
        let cleartext = store.issue(user_id, ChronoDuration::seconds(-1));

        assert!(store.consume(&cleartext).is_err());
    }

    #[test]
    fn unknown_token_is_rejected() {
        let store = ResetTokenStore::new();
        assert!(store.consume("not-a-real-token").is_err());
    }

    #[test]
    fn concurrent_consume_yields_exactly_one_success() {
        let store = Arc::new(ResetTokenStore::new());
        let user_id = Uuid::new_v4();
        let cleartext = Arc::new(store.issue(user_id, ChronoDuration::seconds(900)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let cleartext = cleartext.clone();
                std::thread::spawn(move || store.consume(&cleartext).is_ok())
            })
            .collect();

        let successes: usize = handles.into_iter().map(|h| h.join().unwrap() as usize).sum();
        assert_eq!(successes, 1);
    }
}
