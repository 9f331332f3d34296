use super::*;

impl PostgresCatalogRepository {
    pub(super) async fn find_group_impl(&self, group_id: GroupId) -> AppResult<Option<Group>> {
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM rbac_groups WHERE id = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, GroupRow>(&sql)
            .bind(group_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to find group: {error}")))?;

        Ok(row.map(Group::from))
    }

    pub(super) async fn list_groups_impl(&self) -> AppResult<Vec<Group>> {
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM rbac_groups WHERE deleted_at IS NULL ORDER BY name, id"
        );
        let rows = sqlx::query_as::<_, GroupRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to list groups: {error}")))?;

        Ok(rows.into_iter().map(Group::from).collect())
    }

    pub(super) async fn group_links_impl(&self) -> AppResult<Vec<(GroupId, Option<GroupId>)>> {
        let rows = sqlx::query_as::<_, (i64, Option<i64>)>(
            "SELECT id, parent_id FROM rbac_groups WHERE deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load group links: {error}")))?;

        Ok(rows
            .into_iter()
            .map(|(id, parent_id)| (GroupId::new(id), parent_id.map(GroupId::new)))
            .collect())
    }

    pub(super) async fn create_group_impl(&self, input: NewGroup) -> AppResult<Group> {
        let sql = format!(
            r#"
            INSERT INTO rbac_groups (name, slug, description, parent_id, is_system)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {GROUP_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, GroupRow>(&sql)
            .bind(input.name.as_str())
            .bind(input.slug.as_str())
            .bind(input.description.as_deref())
            .bind(input.parent_id.map(|id| id.as_i64()))
            .bind(input.is_system)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| slug_conflict_or_internal(error, "group", input.slug.as_str()))?;

        Ok(Group::from(row))
    }

    pub(super) async fn update_group_impl(
        &self,
        group_id: GroupId,
        changes: CatalogEntryChanges,
    ) -> AppResult<Group> {
        let sql = format!(
            r#"
            UPDATE rbac_groups
            SET name = $2, description = $3, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {GROUP_COLUMNS}
            "#
        );
        sqlx::query_as::<_, GroupRow>(&sql)
            .bind(group_id.as_i64())
            .bind(changes.name.as_str())
            .bind(changes.description.as_deref())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to update group: {error}")))?
            .map(Group::from)
            .ok_or_else(|| AppError::NotFound(format!("group {group_id} not found")))
    }

    pub(super) async fn set_group_parent_impl(
        &self,
        group_id: GroupId,
        parent_id: Option<GroupId>,
    ) -> AppResult<Group> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        // One hierarchy change at a time, so two concurrent moves cannot close a loop.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended('rbac_group_hierarchy', 0))")
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to lock group hierarchy: {error}"))
            })?;

        if let Some(parent_id) = parent_id {
            let would_cycle = sqlx::query_scalar::<_, bool>(
                r#"
                WITH RECURSIVE ancestors (id, parent_id) AS (
                    SELECT id, parent_id FROM rbac_groups WHERE id = $1
                    UNION
                    SELECT g.id, g.parent_id
                    FROM rbac_groups g
                    JOIN ancestors a ON g.id = a.parent_id
                )
                SELECT EXISTS (SELECT 1 FROM ancestors WHERE id = $2)
                "#,
            )
            .bind(parent_id.as_i64())
            .bind(group_id.as_i64())
            .fetch_one(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to check group ancestry: {error}"))
            })?;
            if would_cycle {
                return Err(AppError::CircularReference(format!(
                    "group {parent_id} cannot become the parent of its ancestor {group_id}"
                )));
            }
        }

        let sql = format!(
            r#"
            UPDATE rbac_groups
            SET parent_id = $2, updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {GROUP_COLUMNS}
            "#
        );
        let group = sqlx::query_as::<_, GroupRow>(&sql)
            .bind(group_id.as_i64())
            .bind(parent_id.map(|id| id.as_i64()))
            .fetch_optional(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to move group: {error}")))?
            .map(Group::from)
            .ok_or_else(|| AppError::NotFound(format!("group {group_id} not found")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(group)
    }

    pub(super) async fn count_group_dependents_impl(
        &self,
        group_id: GroupId,
    ) -> AppResult<GroupDependents> {
        let (child_groups, roles) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM rbac_groups WHERE parent_id = $1 AND deleted_at IS NULL),
                (SELECT COUNT(*) FROM rbac_roles WHERE group_id = $1 AND deleted_at IS NULL)
            "#,
        )
        .bind(group_id.as_i64())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count group dependents: {error}"))
        })?;

        Ok(GroupDependents {
            child_groups: count(child_groups),
            roles: count(roles),
        })
    }

    pub(super) async fn soft_delete_group_impl(&self, group_id: GroupId) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE rbac_groups
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(group_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete group: {error}")))?;

        Ok(())
    }
}
