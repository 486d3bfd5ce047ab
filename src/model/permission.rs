//! Atomic `(action, resource)` capability, landlord-scoped.

use serde::{Deserialize, Serialize};

use super::Id;

/// `(action, resource, landlord_id)` is unique. Both `action` and
/// `resource` are short strings, e.g. `("read", "reports")`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Permission {
    pub id: Id,
    pub landlord_id: Id,
    pub action: String,
    pub resource: String,
}

impl Permission {
    pub fn new(landlord_id: Id, action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            landlord_id,
            action: action.into(),
            resource: resource.into(),
        }
    }

    /// The `action:resource` string form carried in access-token claims.
    pub fn claim(&self) -> String {
        format!("{}:{}", self.action, self.resource)
    }
}
