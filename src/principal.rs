//! Principal Resolver (C4).
//!
//! For a `(user, tenant)` pair produces the effective role set, permission
//! set, and the policies associated with each contributing role→permission
//! binding. A pure read against the data model — denormalized through a
//! process-local cache with a TTL, never materializing anything beyond
//! ids and the small set of scalar fields callers need.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::model::Permission;
use crate::repository::{AssignmentRepository, PermissionRepository, RoleRepository, UserRepository};

/// TTL ceiling from spec §4.4: "MAY cache results per (user-id, tenant-id)
/// with a TTL ≤ 60 s".
const CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: Uuid,
    tenant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedPrincipal {
    pub live: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<Permission>,
    /// Policy ids tied to the bindings that contributed a permission.
    pub policy_ids: Vec<Uuid>,
}

impl ResolvedPrincipal {
    pub fn permission_claims(&self) -> Vec<String> {
        self.permissions.iter().map(Permission::claim).collect()
    }
}

pub struct PrincipalResolver {
    users: Arc<dyn UserRepository>,
    roles: Arc<dyn RoleRepository>,
    permissions: Arc<dyn PermissionRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    cache: moka::sync::Cache<CacheKey, Arc<ResolvedPrincipal>>,
}

impl PrincipalResolver {
    pub fn new(
        users: Arc<dyn UserRepository>,
        roles: Arc<dyn RoleRepository>,
        permissions: Arc<dyn PermissionRepository>,
        assignments: Arc<dyn AssignmentRepository>,
    ) -> Self {
        Self {
            users,
            roles,
            permissions,
            assignments,
            cache: moka::sync::Cache::builder().time_to_live(CACHE_TTL).build(),
        }
    }

    /// `tenant_id = None` returns the "landlord-anchored" view used only
    /// for bootstrap role checks — roles and permissions reachable through
    /// any tenant the user has an assignment in.
    pub async fn resolve(&self, user_id: Uuid, tenant_id: Option<Uuid>) -> Arc<ResolvedPrincipal> {
        let key = CacheKey { user_id, tenant_id };
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let resolved = Arc::new(self.resolve_uncached(user_id, tenant_id).await);
        self.cache.insert(key, resolved.clone());
        resolved
    }

    async fn resolve_uncached(&self, user_id: Uuid, tenant_id: Option<Uuid>) -> ResolvedPrincipal {
        let user = match self.users.find_by_id(user_id).await {
            Some(u) if u.active => u,
            _ => return ResolvedPrincipal::default(),
        };
        let _ = user;

        let role_assignments = self.assignments.role_assignments_for(user_id, tenant_id).await;
        if role_assignments.is_empty() {
            let direct = self.assignments.permission_assignments_for(user_id, tenant_id).await;
            if direct.is_empty() {
                return ResolvedPrincipal::default();
            }
        }

        let mut role_codes = Vec::new();
        let mut permission_ids = std::collections::HashSet::new();
        let mut policy_ids = Vec::new();

        for assignment in &role_assignments {
            if let Some(role) = self.roles.find_by_id(assignment.role_id).await {
                role_codes.push(role.code);
            }
            for binding in self.assignments.bindings_for_role(assignment.role_id).await {
                permission_ids.insert(binding.permission_id);
                if let Some(policy_id) = binding.policy_id {
                    policy_ids.push(policy_id);
                }
            }
        }

        // Direct user-tenant-permission grants are strictly additive with
        // role-derived permissions (spec §9 Open Question resolution).
        for direct in self.assignments.permission_assignments_for(user_id, tenant_id).await {
            permission_ids.insert(direct.permission_id);
        }

        let mut permissions = Vec::new();
        for id in permission_ids {
            if let Some(permission) = self.permissions.find_by_id(id).await {
                permissions.push(permission);
            }
        }

        role_codes.sort();
        role_codes.dedup();
        policy_ids.sort();
        policy_ids.dedup();

        ResolvedPrincipal { live: true, roles: role_codes, permissions, policy_ids }
    }

    /// Write-through invalidation for administrative mutations touching
    /// this pair's assignment, role, or permission rows (spec §4.4).
    pub fn invalidate(&self, user_id: Uuid, tenant_id: Option<Uuid>) {
        self.cache.invalidate(&CacheKey { user_id, tenant_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{new_id, Permission, Role, RoleAssignment, User};
    use crate::repository::{
        InMemoryAssignmentRepository, InMemoryPermissionRepository, InMemoryRoleRepository, InMemoryUserRepository,
    };

    async fn resolver_with_one_role() -> (PrincipalResolver, Uuid, Uuid) {
        let users = Arc::new(InMemoryUserRepository::new());
        let roles = Arc::new(InMemoryRoleRepository::new());
        let permissions = Arc::new(InMemoryPermissionRepository::new());
        let assignments = Arc::new(InMemoryAssignmentRepository::new());

        let landlord_id = new_id();
        let tenant_id = new_id();
        let mut user = User::new("Alice", "alice@example.com", "hash".into());
        user.active = true;
        let user_id = user.id;
        users.insert(user).await.unwrap();

        let role = Role::new(landlord_id, "USER", "User");
        let role_id = role.id;
        roles.insert(role).await.unwrap();

        let permission = Permission::new(landlord_id, "read", "profile");
        let permission_id = permission.id;
        permissions.insert(permission).await.unwrap();

        assignments.insert_role_assignment(RoleAssignment { user_id, tenant_id, role_id }).await.unwrap();
        assignments
            .insert_binding(crate::model::assignment::RolePermissionBinding { role_id, permission_id, policy_id: None })
            .await
            .unwrap();

        (PrincipalResolver::new(users, roles, permissions, assignments), user_id, tenant_id)
    }

    #[tokio::test]
    async fn resolves_roles_and_permissions_for_tenant() {
        let (resolver, user_id, tenant_id) = resolver_with_one_role().await;
        let resolved = resolver.resolve(user_id, Some(tenant_id)).await;

        assert!(resolved.live);
        assert_eq!(resolved.roles, vec!["USER".to_string()]);
        assert_eq!(resolved.permission_claims(), vec!["read:profile".to_string()]);
    }

    #[tokio::test]
    async fn inactive_user_is_not_live() {
        let users = Arc::new(InMemoryUserRepository::new());
        let roles = Arc::new(InMemoryRoleRepository::new());
        let permissions = Arc::new(InMemoryPermissionRepository::new());
        let assignments = Arc::new(InMemoryAssignmentRepository::new());

        let user = User::new("Bob", "bob@example.com", "hash".into());
        let user_id = user.id;
        users.insert(user).await.unwrap();

        let resolver = PrincipalResolver::new(users, roles, permissions, assignments);
        let resolved = resolver.resolve(user_id, None).await;
        assert!(!resolved.live);
    }
}
