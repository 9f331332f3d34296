use async_trait::async_trait;

use adrbac_core::{AppResult, GroupId, PermissionId, RoleId};
use adrbac_domain::{Group, Permission, PermissionKey, Role};

/// Input payload for creating groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    /// Display name.
    pub name: String,
    /// Unique slug.
    pub slug: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional parent group.
    pub parent_id: Option<GroupId>,
    /// Marks the group as system-managed.
    pub is_system: bool,
}

/// Input payload for creating roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    /// Display name.
    pub name: String,
    /// Unique slug.
    pub slug: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional owning group.
    pub group_id: Option<GroupId>,
    /// Marks the role as system-managed.
    pub is_system: bool,
}

/// Input payload for creating permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPermission {
    /// Identity key.
    pub key: PermissionKey,
    /// Display name; derived from the key when absent.
    pub name: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Marks the permission as system-managed.
    pub is_system: bool,
}

/// Replacement values for the descriptive fields of a group or role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntryChanges {
    /// New display name.
    pub name: String,
    /// New description.
    pub description: Option<String>,
}

/// Rows blocking deletion of a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupDependents {
    /// Non-deleted child groups.
    pub child_groups: u64,
    /// Non-deleted roles owned by the group.
    pub roles: u64,
}

/// Rows blocking deletion of a permission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionDependents {
    /// Roles the permission is attached to.
    pub roles: u64,
    /// Active direct assignments of the permission.
    pub direct_holders: u64,
}

/// Repository port for groups, roles and permissions.
///
/// Reads exclude soft-deleted rows.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Finds one group.
    async fn find_group(&self, group_id: GroupId) -> AppResult<Option<Group>>;

    /// Lists groups ordered by name.
    async fn list_groups(&self) -> AppResult<Vec<Group>>;

    /// Returns every `(group, parent)` link of the forest.
    async fn group_links(&self) -> AppResult<Vec<(GroupId, Option<GroupId>)>>;

    /// Creates a group. Duplicate slugs fail with `Conflict`.
    async fn create_group(&self, input: NewGroup) -> AppResult<Group>;

    /// Replaces the descriptive fields of a group.
    async fn update_group(&self, group_id: GroupId, changes: CatalogEntryChanges)
    -> AppResult<Group>;

    /// Moves a group under a new parent, re-checking ancestry atomically.
    async fn set_group_parent(
        &self,
        group_id: GroupId,
        parent_id: Option<GroupId>,
    ) -> AppResult<Group>;

    /// Counts rows blocking deletion of a group.
    async fn count_group_dependents(&self, group_id: GroupId) -> AppResult<GroupDependents>;

    /// Soft-deletes a group.
    async fn soft_delete_group(&self, group_id: GroupId) -> AppResult<()>;

    /// Finds one role.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Lists roles ordered by name.
    async fn list_roles(&self) -> AppResult<Vec<Role>>;

    /// Lists roles owned by a group.
    async fn list_group_roles(&self, group_id: GroupId) -> AppResult<Vec<Role>>;

    /// Creates a role. Duplicate slugs fail with `Conflict`.
    async fn create_role(&self, input: NewRole) -> AppResult<Role>;

    /// Replaces the descriptive fields of a role.
    async fn update_role(&self, role_id: RoleId, changes: CatalogEntryChanges) -> AppResult<Role>;

    /// Moves a role into a group, or out of any group with `None`.
    async fn set_role_group(&self, role_id: RoleId, group_id: Option<GroupId>) -> AppResult<Role>;

    /// Soft-deletes a role and drops its permission links.
    async fn soft_delete_role(&self, role_id: RoleId) -> AppResult<()>;

    /// Lists permission ids attached to a role.
    async fn role_permission_ids(&self, role_id: RoleId) -> AppResult<Vec<PermissionId>>;

    /// Attaches permissions to a role. Returns the ids that were newly linked.
    async fn attach_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<PermissionId>>;

    /// Detaches permissions from a role. Returns the ids that were unlinked.
    async fn detach_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<PermissionId>>;

    /// Finds one permission.
    async fn find_permission(&self, permission_id: PermissionId) -> AppResult<Option<Permission>>;

    /// Finds a permission by its `(module, action)` key.
    async fn find_permission_by_key(&self, key: &PermissionKey) -> AppResult<Option<Permission>>;

    /// Lists permissions ordered by module then action.
    async fn list_permissions(&self) -> AppResult<Vec<Permission>>;

    /// Creates a permission. Duplicate keys fail with `DuplicatePermission`.
    async fn create_permission(&self, input: NewPermission) -> AppResult<Permission>;

    /// Counts rows blocking deletion of a permission.
    async fn count_permission_dependents(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<PermissionDependents>;

    /// Soft-deletes a permission.
    async fn soft_delete_permission(&self, permission_id: PermissionId) -> AppResult<()>;
}

/// Links changed by a role permission sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePermissionChange {
    /// Permissions newly attached.
    pub attached: Vec<PermissionId>,
    /// Permissions detached.
    pub detached: Vec<PermissionId>,
}

/// Memberships changed by a group role sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRoleChange {
    /// Roles moved into the group.
    pub attached: Vec<RoleId>,
    /// Roles moved out of the group.
    pub detached: Vec<RoleId>,
}
