//! Isolation boundary under a landlord; owns policies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Id;

/// A tenant belongs to exactly one landlord. Deactivation is soft — no row
/// is ever removed while referenced by an assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Id,
    pub landlord_id: Id,
    /// Unique within the owning landlord.
    pub name: String,
    pub config: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(landlord_id: Id, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            landlord_id,
            name: name.into(),
            config: Value::Object(Default::default()),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Soft-deactivate. The row is retained; assignments referencing it
    /// remain valid but resolution should treat the tenant as inert.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.updated_at = Utc::now();
    }
}
