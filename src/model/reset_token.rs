//! Single-use, time-bounded password reset token tracked by the
//! [`crate::reset_store`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// Only the hash of the reset token is stored. `consumed_at` is set
/// atomically by the first successful `consume`; the row is never valid
/// again afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetToken {
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub user_id: Id,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl ResetToken {
    pub fn is_valid(&self) -> bool {
        self.consumed_at.is_none() && self.expires_at > Utc::now()
    }
}
