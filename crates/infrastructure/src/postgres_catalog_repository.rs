//! PostgreSQL-backed group, role and permission catalog.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use adrbac_application::{
    CatalogEntryChanges, CatalogRepository, GroupDependents, NewGroup, NewPermission, NewRole,
    PermissionDependents,
};
use adrbac_core::{AppError, AppResult, GroupId, PermissionId, RoleId};
use adrbac_domain::{Group, Permission, PermissionKey, Role};

mod groups;
mod permissions;
mod roles;

#[cfg(test)]
mod tests;

/// PostgreSQL implementation of the catalog repository port.
#[derive(Clone)]
pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GroupRow {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    parent_id: Option<i64>,
    is_system: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Self {
            id: GroupId::new(row.id),
            name: row.name,
            slug: row.slug,
            description: row.description,
            parent_id: row.parent_id.map(GroupId::new),
            is_system: row.is_system,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RoleRow {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    group_id: Option<i64>,
    is_system: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: RoleId::new(row.id),
            name: row.name,
            slug: row.slug,
            description: row.description,
            group_id: row.group_id.map(GroupId::new),
            is_system: row.is_system,
            deleted_at: row.deleted_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PermissionRow {
    id: i64,
    name: String,
    module: String,
    action: String,
    description: Option<String>,
    is_system: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<PermissionRow> for Permission {
    type Error = AppError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PermissionId::new(row.id),
            name: row.name,
            key: PermissionKey::new(row.module, row.action)?,
            description: row.description,
            is_system: row.is_system,
            deleted_at: row.deleted_at,
        })
    }
}

pub(crate) const GROUP_COLUMNS: &str = "id, name, slug, description, parent_id, is_system, deleted_at";
pub(crate) const ROLE_COLUMNS: &str = "id, name, slug, description, group_id, is_system, deleted_at";
pub(crate) const PERMISSION_COLUMNS: &str = "id, name, module, action, description, is_system, deleted_at";

fn is_unique_violation(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(database_error) = error
        && database_error.code().as_deref() == Some("23505")
    {
        return true;
    }
    false
}

fn slug_conflict_or_internal(error: sqlx::Error, kind: &str, slug: &str) -> AppError {
    if is_unique_violation(&error) {
        return AppError::Conflict(format!("{kind} slug '{slug}' already exists"));
    }

    AppError::Internal(format!("failed to create {kind}: {error}"))
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    async fn find_group(&self, group_id: GroupId) -> AppResult<Option<Group>> {
        self.find_group_impl(group_id).await
    }

    async fn list_groups(&self) -> AppResult<Vec<Group>> {
        self.list_groups_impl().await
    }

    async fn group_links(&self) -> AppResult<Vec<(GroupId, Option<GroupId>)>> {
        self.group_links_impl().await
    }

    async fn create_group(&self, input: NewGroup) -> AppResult<Group> {
        self.create_group_impl(input).await
    }

    async fn update_group(
        &self,
        group_id: GroupId,
        changes: CatalogEntryChanges,
    ) -> AppResult<Group> {
        self.update_group_impl(group_id, changes).await
    }

    async fn set_group_parent(
        &self,
        group_id: GroupId,
        parent_id: Option<GroupId>,
    ) -> AppResult<Group> {
        self.set_group_parent_impl(group_id, parent_id).await
    }

    async fn count_group_dependents(&self, group_id: GroupId) -> AppResult<GroupDependents> {
        self.count_group_dependents_impl(group_id).await
    }

    async fn soft_delete_group(&self, group_id: GroupId) -> AppResult<()> {
        self.soft_delete_group_impl(group_id).await
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        self.find_role_impl(role_id).await
    }

    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        self.list_roles_impl().await
    }

    async fn list_group_roles(&self, group_id: GroupId) -> AppResult<Vec<Role>> {
        self.list_group_roles_impl(group_id).await
    }

    async fn create_role(&self, input: NewRole) -> AppResult<Role> {
        self.create_role_impl(input).await
    }

    async fn update_role(&self, role_id: RoleId, changes: CatalogEntryChanges) -> AppResult<Role> {
        self.update_role_impl(role_id, changes).await
    }

    async fn set_role_group(&self, role_id: RoleId, group_id: Option<GroupId>) -> AppResult<Role> {
        self.set_role_group_impl(role_id, group_id).await
    }

    async fn soft_delete_role(&self, role_id: RoleId) -> AppResult<()> {
        self.soft_delete_role_impl(role_id).await
    }

    async fn role_permission_ids(&self, role_id: RoleId) -> AppResult<Vec<PermissionId>> {
        self.role_permission_ids_impl(role_id).await
    }

    async fn attach_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<PermissionId>> {
        self.attach_role_permissions_impl(role_id, permission_ids)
            .await
    }

    async fn detach_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<PermissionId>> {
        self.detach_role_permissions_impl(role_id, permission_ids)
            .await
    }

    async fn find_permission(&self, permission_id: PermissionId) -> AppResult<Option<Permission>> {
        self.find_permission_impl(permission_id).await
    }

    async fn find_permission_by_key(&self, key: &PermissionKey) -> AppResult<Option<Permission>> {
        self.find_permission_by_key_impl(key).await
    }

    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        self.list_permissions_impl().await
    }

    async fn create_permission(&self, input: NewPermission) -> AppResult<Permission> {
        self.create_permission_impl(input).await
    }

    async fn count_permission_dependents(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<PermissionDependents> {
        self.count_permission_dependents_impl(permission_id).await
    }

    async fn soft_delete_permission(&self, permission_id: PermissionId) -> AppResult<()> {
        self.soft_delete_permission_impl(permission_id).await
    }
}
