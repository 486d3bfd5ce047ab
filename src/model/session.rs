//! Live refresh context tracked by the [`crate::session_store`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// `refresh_token_hash` is a unique secondary index; the raw refresh
/// secret is never stored. A session is live iff `expires_at > now` —
/// callers must not cache liveness across calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Id,
    pub user_id: Id,
    #[serde(skip_serializing)]
    pub refresh_token_hash: String,
    pub user_agent: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_live(&self) -> bool {
        self.expires_at > Utc::now()
    }
}
