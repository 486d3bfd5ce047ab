//! Landlord-scoped RBAC role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// A role is scoped to a landlord: `(code, landlord_id)` and
/// `(name, landlord_id)` are both unique. The global super-admin role lives
/// under the system root landlord.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Id,
    pub landlord_id: Id,
    /// Machine identifier, e.g. `"ADMIN"`.
    pub code: String,
    pub display_name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(landlord_id: Id, code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            landlord_id,
            code: code.into(),
            display_name: display_name.into(),
            description: None,
            created_at: Utc::now(),
        }
    }
}
