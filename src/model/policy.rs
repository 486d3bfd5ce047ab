//! Tenant-owned ABAC rule. See [`crate::policy_engine`] for evaluation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Id;

/// `DENY` policies are evaluated strictly before `ALLOW` policies — see
/// [`crate::policy_engine::Evaluator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// `code` is unique within the owning tenant. `conditions` is a free-form
/// JSON condition document parsed by the policy engine into the recognized
/// predicate grammar; unknown keys in the document evaluate to `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Id,
    pub tenant_id: Id,
    pub code: String,
    pub display_name: String,
    pub effect: Effect,
    /// May contain the sentinel `"*"` to match any action.
    pub actions: Vec<String>,
    /// May contain the sentinel `"*"` to match any resource.
    pub resources: Vec<String>,
    pub conditions: Value,
}

impl Policy {
    pub fn matches_action_resource(&self, action: &str, resource: &str) -> bool {
        let action_matches = self.actions.iter().any(|a| a == "*" || a == action);
        let resource_matches = self.resources.iter().any(|r| r == "*" || r == resource);
        action_matches && resource_matches
    }
}
