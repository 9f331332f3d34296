use async_trait::async_trait;
use serde::Serialize;

use adrbac_core::{AppResult, EmployeeId};
use adrbac_domain::{EffectivePermissionSet, Group, Permission, Role};

/// Permissions granted through one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolePermissions {
    /// Role.
    pub role: Role,
    /// Non-deleted permissions attached to the role.
    pub permissions: Vec<Permission>,
}

/// Permissions granted through one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupPermissions {
    /// Group.
    pub group: Group,
    /// Roles owned by the group with their permissions.
    pub roles: Vec<RolePermissions>,
}

/// Effective permissions of one employee split by the path that grants them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionBreakdown {
    /// Directly assigned permissions.
    pub direct: Vec<Permission>,
    /// Permissions reached through directly assigned roles.
    pub through_roles: Vec<RolePermissions>,
    /// Permissions reached through directly assigned groups.
    pub through_groups: Vec<GroupPermissions>,
}

impl PermissionBreakdown {
    /// Returns the deduplicated union of all three paths.
    #[must_use]
    pub fn effective_set(&self) -> EffectivePermissionSet {
        let through_roles = self
            .through_roles
            .iter()
            .flat_map(|entry| entry.permissions.iter());
        let through_groups = self
            .through_groups
            .iter()
            .flat_map(|group| group.roles.iter())
            .flat_map(|entry| entry.permissions.iter());

        self.direct
            .iter()
            .chain(through_roles)
            .chain(through_groups)
            .map(Permission::slug)
            .collect()
    }
}

/// Read port over the three permission paths.
///
/// Every method considers only current assignments and non-deleted catalog
/// rows.
#[async_trait]
pub trait PermissionSourceRepository: Send + Sync {
    /// Returns the employee's permissions split by path.
    async fn permission_breakdown(&self, employee_id: EmployeeId)
    -> AppResult<PermissionBreakdown>;

    /// Returns whether the permission is directly assigned.
    async fn has_direct_permission(&self, employee_id: EmployeeId, slug: &str) -> AppResult<bool>;

    /// Returns whether a directly assigned role carries the permission.
    async fn has_role_permission(&self, employee_id: EmployeeId, slug: &str) -> AppResult<bool>;

    /// Returns whether a role of a directly assigned group carries the permission.
    async fn has_group_role_permission(
        &self,
        employee_id: EmployeeId,
        slug: &str,
    ) -> AppResult<bool>;
}

/// Cache port for resolved permission sets keyed by employee.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Returns the cached set for an employee.
    async fn get(&self, employee_id: EmployeeId) -> AppResult<Option<EffectivePermissionSet>>;

    /// Stores the set for an employee with ttl.
    async fn put(
        &self,
        employee_id: EmployeeId,
        permissions: &EffectivePermissionSet,
        ttl_seconds: u32,
    ) -> AppResult<()>;

    /// Removes the cached set for an employee.
    async fn invalidate(&self, employee_id: EmployeeId) -> AppResult<()>;
}
