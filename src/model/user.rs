//! Global principal. Not tenant-scoped — tenant membership lives in the
//! assignment tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// A user's password hash is either `$argon2id$…` (preferred, produced by
/// [`crate::hasher::PasswordHasher`]) or a legacy `$2…` bcrypt hash. No
/// plaintext is ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub display_name: String,
    /// Globally unique, case-insensitive. Callers are responsible for
    /// lower-casing before lookup; the core does not normalize silently.
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub active: bool,
    pub email_verification_token: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Users are created inactive; they become active on e-mail
    /// verification or administrative activation.
    pub fn new(display_name: impl Into<String>, email: impl Into<String>, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            display_name: display_name.into(),
            email: email.into(),
            password_hash,
            active: false,
            email_verification_token: Some(uuid::Uuid::new_v4().to_string()),
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn verify_email(&mut self) {
        self.email_verification_token = None;
        self.email_verified_at = Some(Utc::now());
        self.active = true;
        self.updated_at = Utc::now();
    }

    pub fn activate(&mut self) {
        self.active = true;
        self.updated_at = Utc::now();
    }
}
