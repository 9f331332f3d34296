use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by assignment, catalog and login use-cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when an assignment is created.
    AssignmentCreated,
    /// Emitted when an assignment is revoked.
    AssignmentDeactivated,
    /// Emitted when an assignment expiry is extended.
    AssignmentExtended,
    /// Emitted when the expiry sweep deactivates assignments.
    AssignmentsExpired,
    /// Emitted when a group is created.
    GroupCreated,
    /// Emitted when a group is renamed, described or re-parented.
    GroupUpdated,
    /// Emitted when a group is soft-deleted.
    GroupDeleted,
    /// Emitted when the roles owned by a group change.
    GroupRolesChanged,
    /// Emitted when a role is created.
    RoleCreated,
    /// Emitted when a role is updated.
    RoleUpdated,
    /// Emitted when a role is soft-deleted.
    RoleDeleted,
    /// Emitted when permissions are attached to or detached from a role.
    RolePermissionsChanged,
    /// Emitted when a role moves between groups.
    RoleGroupChanged,
    /// Emitted when a permission is created.
    PermissionCreated,
    /// Emitted when a permission is soft-deleted.
    PermissionDeleted,
    /// Emitted after a successful login.
    EmployeeLoggedIn,
    /// Emitted when an employee is refreshed from the HR source.
    EmployeeSynced,
    /// Emitted when the HR source no longer lists an employee.
    EmployeeDeactivated,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssignmentCreated => "rbac.assignment.created",
            Self::AssignmentDeactivated => "rbac.assignment.deactivated",
            Self::AssignmentExtended => "rbac.assignment.extended",
            Self::AssignmentsExpired => "rbac.assignment.expired",
            Self::GroupCreated => "rbac.group.created",
            Self::GroupUpdated => "rbac.group.updated",
            Self::GroupDeleted => "rbac.group.deleted",
            Self::GroupRolesChanged => "rbac.group.roles_changed",
            Self::RoleCreated => "rbac.role.created",
            Self::RoleUpdated => "rbac.role.updated",
            Self::RoleDeleted => "rbac.role.deleted",
            Self::RolePermissionsChanged => "rbac.role.permissions_changed",
            Self::RoleGroupChanged => "rbac.role.group_changed",
            Self::PermissionCreated => "rbac.permission.created",
            Self::PermissionDeleted => "rbac.permission.deleted",
            Self::EmployeeLoggedIn => "employee.logged_in",
            Self::EmployeeSynced => "employee.synced",
            Self::EmployeeDeactivated => "employee.deactivated",
        }
    }
}
