//! Join tables binding the RBAC graph together.

use serde::{Deserialize, Serialize};

use super::Id;

/// Many-to-many join between a role and a permission, optionally tagged
/// with a policy. When a policy is attached, it MUST be satisfied (see
/// [`crate::policy_engine`]) for the permission to be granted via that
/// role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermissionBinding {
    pub role_id: Id,
    pub permission_id: Id,
    pub policy_id: Option<Id>,
}

/// `(user_id, tenant_id, role_id)` is the primary key. The only supported
/// way a user acquires roles inside a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RoleAssignment {
    pub user_id: Id,
    pub tenant_id: Id,
    pub role_id: Id,
}

/// Direct grant of a permission to a user within a tenant, bypassing
/// roles. Additive with role-derived permissions — never a conflict rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PermissionAssignment {
    pub user_id: Id,
    pub tenant_id: Id,
    pub permission_id: Id,
}
