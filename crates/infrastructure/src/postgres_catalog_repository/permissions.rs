use super::*;

impl PostgresCatalogRepository {
    pub(super) async fn find_permission_impl(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<Permission>> {
        let sql = format!(
            "SELECT {PERMISSION_COLUMNS} FROM rbac_permissions WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(permission_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to find permission: {error}")))?
            .map(Permission::try_from)
            .transpose()
    }

    pub(super) async fn find_permission_by_key_impl(
        &self,
        key: &PermissionKey,
    ) -> AppResult<Option<Permission>> {
        let sql = format!(
            r#"
            SELECT {PERMISSION_COLUMNS}
            FROM rbac_permissions
            WHERE module = $1 AND action = $2 AND deleted_at IS NULL
            "#
        );
        sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(key.module())
            .bind(key.action())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to find permission: {error}")))?
            .map(Permission::try_from)
            .transpose()
    }

    pub(super) async fn list_permissions_impl(&self) -> AppResult<Vec<Permission>> {
        let sql = format!(
            r#"
            SELECT {PERMISSION_COLUMNS}
            FROM rbac_permissions
            WHERE deleted_at IS NULL
            ORDER BY module, action
            "#
        );
        let rows = sqlx::query_as::<_, PermissionRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to list permissions: {error}")))?;

        rows.into_iter().map(Permission::try_from).collect()
    }

    pub(super) async fn create_permission_impl(
        &self,
        input: NewPermission,
    ) -> AppResult<Permission> {
        let name = input
            .name
            .clone()
            .unwrap_or_else(|| input.key.display_name());
        let sql = format!(
            r#"
            INSERT INTO rbac_permissions (name, slug, module, action, description, is_system)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PERMISSION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(name)
            .bind(input.key.slug())
            .bind(input.key.module())
            .bind(input.key.action())
            .bind(input.description.as_deref())
            .bind(input.is_system)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                if is_unique_violation(&error) {
                    return AppError::DuplicatePermission {
                        module: input.key.module().to_owned(),
                        action: input.key.action().to_owned(),
                    };
                }
                AppError::Internal(format!("failed to create permission: {error}"))
            })?;

        Permission::try_from(row)
    }

    pub(super) async fn count_permission_dependents_impl(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<PermissionDependents> {
        let (roles, direct_holders) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (
                    SELECT COUNT(*)
                    FROM rbac_role_permissions rp
                    JOIN rbac_roles r ON r.id = rp.role_id AND r.deleted_at IS NULL
                    WHERE rp.permission_id = $1
                ),
                (
                    SELECT COUNT(*)
                    FROM rbac_assignments
                    WHERE assignable_type = 'permission'
                      AND assignable_id = $1
                      AND is_active
                      AND (expires_at IS NULL OR expires_at > now())
                )
            "#,
        )
        .bind(permission_id.as_i64())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count permission dependents: {error}"))
        })?;

        Ok(PermissionDependents {
            roles: count(roles),
            direct_holders: count(direct_holders),
        })
    }

    pub(super) async fn soft_delete_permission_impl(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE rbac_permissions
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(permission_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete permission: {error}")))?;

        Ok(())
    }
}
