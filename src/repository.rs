//! Repository seam (spec §9.4 ambient addition).
//!
//! The ORM/persistence driver is out of scope (spec.md §1), but the
//! orchestrator and resolver need some collaborator to read and write
//! users, tenants, roles, permissions, policies, and assignments. These
//! traits are that seam; the in-memory implementations are
//! `dashmap`-backed reference implementations suitable for this crate's
//! own tests and as a starting point for an adapter over a real database
//! (the teacher's `database` module anticipates exactly this swap).

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::model::{
    assignment::RolePermissionBinding, Permission, PermissionAssignment, Policy, Role,
    RoleAssignment, Tenant, User,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Option<User>;
    /// Case-insensitive lookup; callers pass the email as given.
    async fn find_by_email(&self, email: &str) -> Option<User>;
    async fn insert(&self, user: User) -> Result<(), crate::error::Error>;
    async fn update(&self, user: User) -> Result<(), crate::error::Error>;
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Option<Tenant>;
    async fn insert(&self, tenant: Tenant) -> Result<(), crate::error::Error>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Option<Role>;
    async fn insert(&self, role: Role) -> Result<(), crate::error::Error>;
}

#[async_trait]
pub trait PermissionRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Option<Permission>;
    async fn insert(&self, permission: Permission) -> Result<(), crate::error::Error>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Option<Policy>;
    async fn find_by_ids(&self, ids: &[Uuid]) -> Vec<Policy>;
    async fn insert(&self, policy: Policy) -> Result<(), crate::error::Error>;
}

/// Reads and writes the RBAC join tables: role assignments, direct
/// permission assignments, and role→permission bindings.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// `tenant_id = None` aggregates across every tenant the user has a
    /// role assignment in (spec §4.4 "landlord-anchored view").
    async fn role_assignments_for(&self, user_id: Uuid, tenant_id: Option<Uuid>) -> Vec<RoleAssignment>;
    async fn permission_assignments_for(&self, user_id: Uuid, tenant_id: Option<Uuid>) -> Vec<PermissionAssignment>;
    async fn bindings_for_role(&self, role_id: Uuid) -> Vec<RolePermissionBinding>;

    async fn insert_role_assignment(&self, assignment: RoleAssignment) -> Result<(), crate::error::Error>;
    async fn insert_permission_assignment(&self, assignment: PermissionAssignment) -> Result<(), crate::error::Error>;
    async fn insert_binding(&self, binding: RolePermissionBinding) -> Result<(), crate::error::Error>;
}

// ============================================================================
// In-memory reference implementations
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserRepository {
    by_id: DashMap<Uuid, User>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Option<User> {
        self.by_id.get(&id).map(|u| u.clone())
    }

    async fn find_by_email(&self, email: &str) -> Option<User> {
        let needle = email.to_ascii_lowercase();
        self.by_id.iter().find(|u| u.email.to_ascii_lowercase() == needle).map(|u| u.clone())
    }

    async fn insert(&self, user: User) -> Result<(), crate::error::Error> {
        if self.find_by_email(&user.email).await.is_some() {
            return Err(crate::error::Error::Conflict("email already taken".into()));
        }
        self.by_id.insert(user.id, user);
        Ok(())
    }

    async fn update(&self, user: User) -> Result<(), crate::error::Error> {
        self.by_id.insert(user.id, user);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTenantRepository {
    by_id: DashMap<Uuid, Tenant>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn find_by_id(&self, id: Uuid) -> Option<Tenant> {
        self.by_id.get(&id).map(|t| t.clone())
    }

    async fn insert(&self, tenant: Tenant) -> Result<(), crate::error::Error> {
        self.by_id.insert(tenant.id, tenant);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRoleRepository {
    by_id: DashMap<Uuid, Role>,
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn find_by_id(&self, id: Uuid) -> Option<Role> {
        self.by_id.get(&id).map(|r| r.clone())
    }

    async fn insert(&self, role: Role) -> Result<(), crate::error::Error> {
        self.by_id.insert(role.id, role);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPermissionRepository {
    by_id: DashMap<Uuid, Permission>,
}

impl InMemoryPermissionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionRepository for InMemoryPermissionRepository {
    async fn find_by_id(&self, id: Uuid) -> Option<Permission> {
        self.by_id.get(&id).map(|p| p.clone())
    }

    async fn insert(&self, permission: Permission) -> Result<(), crate::error::Error> {
        self.by_id.insert(permission.id, permission);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPolicyRepository {
    by_id: DashMap<Uuid, Policy>,
}

impl InMemoryPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn find_by_id(&self, id: Uuid) -> Option<Policy> {
        self.by_id.get(&id).map(|p| p.clone())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Vec<Policy> {
        ids.iter().filter_map(|id| self.by_id.get(id).map(|p| p.clone())).collect()
    }

    async fn insert(&self, policy: Policy) -> Result<(), crate::error::Error> {
        self.by_id.insert(policy.id, policy);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAssignmentRepository {
    role_assignments: DashMap<(Uuid, Uuid, Uuid), RoleAssignment>,
    permission_assignments: DashMap<(Uuid, Uuid, Uuid), PermissionAssignment>,
    bindings: DashMap<Uuid, Vec<RolePermissionBinding>>,
}

impl InMemoryAssignmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryAssignmentRepository {
    async fn role_assignments_for(&self, user_id: Uuid, tenant_id: Option<Uuid>) -> Vec<RoleAssignment> {
        self.role_assignments
            .iter()
            .map(|e| e.value().clone())
            .filter(|a| a.user_id == user_id && tenant_id.map_or(true, |t| a.tenant_id == t))
            .collect()
    }

    async fn permission_assignments_for(&self, user_id: Uuid, tenant_id: Option<Uuid>) -> Vec<PermissionAssignment> {
        self.permission_assignments
            .iter()
            .map(|e| e.value().clone())
            .filter(|a| a.user_id == user_id && tenant_id.map_or(true, |t| a.tenant_id == t))
            .collect()
    }

    async fn bindings_for_role(&self, role_id: Uuid) -> Vec<RolePermissionBinding> {
        self.bindings.get(&role_id).map(|v| v.clone()).unwrap_or_default()
    }

    async fn insert_role_assignment(&self, assignment: RoleAssignment) -> Result<(), crate::error::Error> {
        let key = (assignment.user_id, assignment.tenant_id, assignment.role_id);
        self.role_assignments.insert(key, assignment);
        Ok(())
    }

    async fn insert_permission_assignment(&self, assignment: PermissionAssignment) -> Result<(), crate::error::Error> {
        let key = (assignment.user_id, assignment.tenant_id, assignment.permission_id);
        self.permission_assignments.insert(key, assignment);
        Ok(())
    }

    async fn insert_binding(&self, binding: RolePermissionBinding) -> Result<(), crate::error::Error> {
        self.bindings.entry(binding.role_id).or_default().push(binding);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::new_id;

    #[tokio::test]
    async fn user_repository_rejects_duplicate_email() {
        let repo = InMemoryUserRepository::new();
        let user = User::new("Alice", "alice@example.com", "$argon2id$…".into());
        repo.insert(user.clone()).await.unwrap();

        let duplicate = User::new("Alice Two", "ALICE@example.com", "$argon2id$…".into());
        assert!(repo.insert(duplicate).await.is_err());
    }

    #[tokio::test]
    async fn assignment_repository_filters_by_tenant() {
        let repo = InMemoryAssignmentRepository::new();
        let user_id = new_id();
        let tenant_a = new_id();
        let tenant_b = new_id();
        let role_id = new_id();

        repo.insert_role_assignment(RoleAssignment { user_id, tenant_id: tenant_a, role_id }).await.unwrap();
        repo.insert_role_assignment(RoleAssignment { user_id, tenant_id: tenant_b, role_id }).await.unwrap();

        assert_eq!(repo.role_assignments_for(user_id, Some(tenant_a)).await.len(), 1);
        assert_eq!(repo.role_assignments_for(user_id, None).await.len(), 2);
    }
}
