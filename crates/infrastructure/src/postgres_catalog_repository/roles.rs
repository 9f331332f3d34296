use super::*;

impl PostgresCatalogRepository {
    pub(super) async fn find_role_impl(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let sql =
            format!("SELECT {ROLE_COLUMNS} FROM rbac_roles WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(role_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to find role: {error}")))?;

        Ok(row.map(Role::from))
    }

    pub(super) async fn list_roles_impl(&self) -> AppResult<Vec<Role>> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM rbac_roles WHERE deleted_at IS NULL ORDER BY name, id"
        );
        let rows = sqlx::query_as::<_, RoleRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        Ok(rows.into_iter().map(Role::from).collect())
    }

    pub(super) async fn list_group_roles_impl(&self, group_id: GroupId) -> AppResult<Vec<Role>> {
        let sql = format!(
            r#"
            SELECT {ROLE_COLUMNS}
            FROM rbac_roles
            WHERE group_id = $1 AND deleted_at IS NULL
            ORDER BY name, id
            "#
        );
        let rows = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(group_id.as_i64())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to list roles of group {group_id}: {error}"))
            })?;

        Ok(rows.into_iter().map(Role::from).collect())
    }

    pub(super) async fn create_role_impl(&self, input: NewRole) -> AppResult<Role> {
        let sql = format!(
            r#"
            INSERT INTO rbac_roles (name, slug, description, group_id, is_system)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ROLE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(input.name.as_str())
            .bind(input.slug.as_str())
            .bind(input.description.as_deref())
            .bind(input.group_id.map(|id| id.as_i64()))
            .bind(input.is_system)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| slug_conflict_or_internal(error, "role", input.slug.as_str()))?;

        Ok(Role::from(row))
    }

    pub(super) async fn update_role_impl(
        &self,
        role_id: RoleId,
        changes: CatalogEntryChanges,
    ) -> AppResult<Role> {
        let sql = format!(
            r#"
            UPDATE rbac_roles
            SET name = $2, description = $3, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ROLE_COLUMNS}
            "#
        );
        sqlx::query_as::<_, RoleRow>(&sql)
            .bind(role_id.as_i64())
            .bind(changes.name.as_str())
            .bind(changes.description.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to update role: {error}")))?
            .map(Role::from)
            .ok_or_else(|| AppError::NotFound(format!("role {role_id} not found")))
    }

    pub(super) async fn set_role_group_impl(
        &self,
        role_id: RoleId,
        group_id: Option<GroupId>,
    ) -> AppResult<Role> {
        let sql = format!(
            r#"
            UPDATE rbac_roles
            SET group_id = $2, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ROLE_COLUMNS}
            "#
        );
        sqlx::query_as::<_, RoleRow>(&sql)
            .bind(role_id.as_i64())
            .bind(group_id.map(|id| id.as_i64()))
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to move role: {error}")))?
            .map(Role::from)
            .ok_or_else(|| AppError::NotFound(format!("role {role_id} not found")))
    }

    pub(super) async fn soft_delete_role_impl(&self, role_id: RoleId) -> AppResult<()> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        sqlx::query("DELETE FROM rbac_role_permissions WHERE role_id = $1")
            .bind(role_id.as_i64())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to drop role permissions: {error}"))
            })?;

        sqlx::query(
            r#"
            UPDATE rbac_roles
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(role_id.as_i64())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete role: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }

    pub(super) async fn role_permission_ids_impl(
        &self,
        role_id: RoleId,
    ) -> AppResult<Vec<PermissionId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT rp.permission_id
            FROM rbac_role_permissions rp
            JOIN rbac_permissions p ON p.id = rp.permission_id AND p.deleted_at IS NULL
            WHERE rp.role_id = $1
            ORDER BY rp.permission_id
            "#,
        )
        .bind(role_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list permissions of role {role_id}: {error}"))
        })?;

        Ok(ids.into_iter().map(PermissionId::new).collect())
    }

    pub(super) async fn attach_role_permissions_impl(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<PermissionId>> {
        if permission_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut attached = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO rbac_role_permissions (role_id, permission_id)
            SELECT $1, permission_id
            FROM UNNEST($2::BIGINT[]) AS requested (permission_id)
            ON CONFLICT (role_id, permission_id) DO NOTHING
            RETURNING permission_id
            "#,
        )
        .bind(role_id.as_i64())
        .bind(raw_ids(permission_ids))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to attach permissions to role {role_id}: {error}"))
        })?;
        attached.sort_unstable();

        Ok(attached.into_iter().map(PermissionId::new).collect())
    }

    pub(super) async fn detach_role_permissions_impl(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<PermissionId>> {
        if permission_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut detached = sqlx::query_scalar::<_, i64>(
            r#"
            DELETE FROM rbac_role_permissions
            WHERE role_id = $1 AND permission_id = ANY($2)
            RETURNING permission_id
            "#,
        )
        .bind(role_id.as_i64())
        .bind(raw_ids(permission_ids))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to detach permissions from role {role_id}: {error}"
            ))
        })?;
        detached.sort_unstable();

        Ok(detached.into_iter().map(PermissionId::new).collect())
    }
}

fn raw_ids(permission_ids: &[PermissionId]) -> Vec<i64> {
    let mut ids: Vec<i64> = permission_ids.iter().map(PermissionId::as_i64).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
