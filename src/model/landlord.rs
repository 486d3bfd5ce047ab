//! Top-level isolation boundary owning a set of tenants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Id;

/// Root owner of tenants, roles, and permissions.
///
/// The system root landlord hosts the global super-admin role; every other
/// landlord is an ordinary customer-facing organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Landlord {
    pub id: Id,
    /// Globally unique.
    pub name: String,
    /// Free-form configuration document, opaque to the core.
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Landlord {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: super::new_id(),
            name: name.into(),
            config: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }
}
