//! Session Store (C3).
//!
//! Keyed by session-id (primary) and by hash-of-refresh-token (unique
//! secondary). A session is live exclusively when its row exists and
//! `expires_at > now` — nothing here caches liveness across calls.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::{DashMap, DashSet};
use thiserror::Error;
use uuid::Uuid;

use crate::model::Session;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session not found")]
    NotFound,
    /// Concurrent rotation lost the compare-and-swap race — the caller's
    /// view of the session was already stale.
    #[error("session was concurrently rotated")]
    StaleRotation,
}

/// In-memory reference implementation. `dashmap`-backed, matching the
/// concurrent-map style the teacher uses for its JWT blacklist and
/// refresh-token maps.
pub struct SessionStore {
    by_id: DashMap<Uuid, Session>,
    by_refresh_hash: DashMap<String, Uuid>,
    by_user: DashMap<Uuid, DashSet<Uuid>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            by_id: DashMap::new(),
            by_refresh_hash: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    pub fn create(
        &self,
        user_id: Uuid,
        refresh_token_hash: String,
        user_agent: impl Into<String>,
        ip_address: impl Into<String>,
        ttl: chrono::Duration,
    ) -> Session {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            refresh_token_hash: refresh_token_hash.clone(),
            user_agent: user_agent.into(),
            ip_address: ip_address.into(),
            created_at: now,
            expires_at: now + ttl,
        };

        self.by_refresh_hash.insert(refresh_token_hash, session.id);
        self.by_user.entry(user_id).or_default().insert(session.id);
        self.by_id.insert(session.id, session.clone());
        session
    }

    pub fn find(&self, session_id: Uuid) -> Option<Session> {
        self.by_id.get(&session_id).filter(|s| s.is_live()).map(|s| s.clone())
    }

    pub fn lookup_by_refresh_hash(&self, hash: &str) -> Option<Session> {
        let session_id = *self.by_refresh_hash.get(hash)?;
        self.find(session_id)
    }

    /// Atomic swap of hash and expiry. Any concurrent lookup by the old
    /// hash fails once this returns — the old hash's mapping is removed
    /// before the new one is published.
    pub fn rotate(
        &self,
        session_id: Uuid,
        new_refresh_token_hash: String,
        new_ttl: ChronoDuration,
    ) -> Result<Session, SessionStoreError> {
        let mut entry = self.by_id.get_mut(&session_id).ok_or(SessionStoreError::NotFound)?;
        if !entry.is_live() {
            return Err(SessionStoreError::NotFound);
        }

        let old_hash = std::mem::replace(&mut entry.refresh_token_hash, new_refresh_token_hash.clone());
        entry.expires_at = Utc::now() + new_ttl;
        let updated = entry.clone();
        drop(entry);

        self.by_refresh_hash.remove(&old_hash);
        self.by_refresh_hash.insert(new_refresh_token_hash, session_id);

        Ok(updated)
    }

    /// Sets `expires_at` to a past instant. Idempotent.
    pub fn revoke(&self, session_id: Uuid) {
        if let Some(mut session) = self.by_id.get_mut(&session_id) {
            session.expires_at = Utc::now() - ChronoDuration::seconds(1);
        }
    }

    /// Fans out over all of the user's sessions. Used by password-change
    /// and reset flows.
    pub fn revoke_all(&self, user_id: Uuid) {
        if let Some(ids) = self.by_user.get(&user_id) {
            for id in ids.iter() {
                self.revoke(*id);
            }
        }
    }

    /// Safe to run concurrently; deletions are eventual — lookups must
    /// (and do) filter by expiry regardless of whether this has run.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let expired_ids: Vec<Uuid> = self
            .by_id
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.id)
            .collect();

        for id in &expired_ids {
            if let Some((_, session)) = self.by_id.remove(id) {
                self.by_refresh_hash.remove(&session.refresh_token_hash);
                if let Some(ids) = self.by_user.get(&session.user_id) {
                    ids.remove(id);
                }
            }
        }

        expired_ids.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
