//! Read model over direct, role and group permission paths.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use adrbac_application::{
    GroupPermissions, PermissionBreakdown, PermissionSourceRepository, RolePermissions,
};
use adrbac_core::{AppError, AppResult, EmployeeId};
use adrbac_domain::{Group, Permission, Role};

use crate::postgres_catalog_repository::{
    GROUP_COLUMNS, GroupRow, PERMISSION_COLUMNS, PermissionRow, ROLE_COLUMNS, RoleRow,
};

const CURRENT_ASSIGNMENT: &str = "a.is_active AND (a.expires_at IS NULL OR a.expires_at > now())";

/// PostgreSQL implementation of the permission source port.
#[derive(Clone)]
pub struct PostgresPermissionSourceRepository {
    pool: PgPool,
}

impl PostgresPermissionSourceRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn held_ids(
        transaction: &mut Transaction<'_, Postgres>,
        employee_id: EmployeeId,
        assignable_type: &str,
    ) -> AppResult<Vec<i64>> {
        let sql = format!(
            r#"
            SELECT DISTINCT a.assignable_id
            FROM rbac_assignments a
            WHERE a.employee_id = $1 AND a.assignable_type = $2 AND {CURRENT_ASSIGNMENT}
            "#
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(employee_id.as_i64())
            .bind(assignable_type)
            .fetch_all(&mut **transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to list held {assignable_type} assignments: {error}"
                ))
            })
    }

    async fn exists(&self, sql: &str, employee_id: EmployeeId, slug: &str) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(sql)
            .bind(employee_id.as_i64())
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to check permission '{slug}': {error}"))
            })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RolePermissionRow {
    role_id: i64,
    #[sqlx(flatten)]
    permission: PermissionRow,
}

async fn permissions_by_ids(
    transaction: &mut Transaction<'_, Postgres>,
    permission_ids: &[i64],
) -> AppResult<Vec<Permission>> {
    let sql = format!(
        r#"
        SELECT {PERMISSION_COLUMNS}
        FROM rbac_permissions
        WHERE id = ANY($1) AND deleted_at IS NULL
        ORDER BY module, action
        "#
    );
    let rows = sqlx::query_as::<_, PermissionRow>(&sql)
        .bind(permission_ids)
        .fetch_all(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load direct permissions: {error}"))
        })?;

    rows.into_iter().map(Permission::try_from).collect()
}

async fn roles_where(
    transaction: &mut Transaction<'_, Postgres>,
    column: &str,
    ids: &[i64],
) -> AppResult<Vec<Role>> {
    let sql = format!(
        r#"
        SELECT {ROLE_COLUMNS}
        FROM rbac_roles
        WHERE {column} = ANY($1) AND deleted_at IS NULL
        ORDER BY name, id
        "#
    );
    let rows = sqlx::query_as::<_, RoleRow>(&sql)
        .bind(ids)
        .fetch_all(&mut **transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load roles: {error}")))?;

    Ok(rows.into_iter().map(Role::from).collect())
}

async fn groups_by_ids(
    transaction: &mut Transaction<'_, Postgres>,
    group_ids: &[i64],
) -> AppResult<Vec<Group>> {
    let sql = format!(
        r#"
        SELECT {GROUP_COLUMNS}
        FROM rbac_groups
        WHERE id = ANY($1) AND deleted_at IS NULL
        ORDER BY name, id
        "#
    );
    let rows = sqlx::query_as::<_, GroupRow>(&sql)
        .bind(group_ids)
        .fetch_all(&mut **transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load groups: {error}")))?;

    Ok(rows.into_iter().map(Group::from).collect())
}

async fn permissions_by_role(
    transaction: &mut Transaction<'_, Postgres>,
    role_ids: &[i64],
) -> AppResult<BTreeMap<i64, Vec<Permission>>> {
    let rows = sqlx::query_as::<_, RolePermissionRow>(
        r#"
        SELECT
            rp.role_id,
            p.id,
            p.name,
            p.module,
            p.action,
            p.description,
            p.is_system,
            p.deleted_at
        FROM rbac_role_permissions rp
        JOIN rbac_permissions p ON p.id = rp.permission_id AND p.deleted_at IS NULL
        WHERE rp.role_id = ANY($1)
        ORDER BY p.module, p.action
        "#,
    )
    .bind(role_ids)
    .fetch_all(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to load role permissions: {error}")))?;

    let mut by_role: BTreeMap<i64, Vec<Permission>> = BTreeMap::new();
    for row in rows {
        by_role
            .entry(row.role_id)
            .or_default()
            .push(Permission::try_from(row.permission)?);
    }
    Ok(by_role)
}

fn with_permissions(role: Role, by_role: &BTreeMap<i64, Vec<Permission>>) -> RolePermissions {
    let permissions = by_role
        .get(&role.id.as_i64())
        .cloned()
        .unwrap_or_default();
    RolePermissions { role, permissions }
}

#[async_trait]
impl PermissionSourceRepository for PostgresPermissionSourceRepository {
    async fn permission_breakdown(
        &self,
        employee_id: EmployeeId,
    ) -> AppResult<PermissionBreakdown> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin permission read: {error}"))
        })?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to configure permission read: {error}"))
            })?;

        let permission_ids = Self::held_ids(&mut transaction, employee_id, "permission").await?;
        let role_ids = Self::held_ids(&mut transaction, employee_id, "role").await?;
        let group_ids = Self::held_ids(&mut transaction, employee_id, "group").await?;

        let direct = permissions_by_ids(&mut transaction, &permission_ids).await?;
        let held_roles = roles_where(&mut transaction, "id", &role_ids).await?;
        let groups = groups_by_ids(&mut transaction, &group_ids).await?;
        let live_group_ids = groups
            .iter()
            .map(|group| group.id.as_i64())
            .collect::<Vec<_>>();
        let group_roles = roles_where(&mut transaction, "group_id", &live_group_ids).await?;

        let all_role_ids = held_roles
            .iter()
            .chain(group_roles.iter())
            .map(|role| role.id.as_i64())
            .collect::<Vec<_>>();
        let by_role = permissions_by_role(&mut transaction, &all_role_ids).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to finish permission read: {error}"))
        })?;

        let through_roles = held_roles
            .into_iter()
            .map(|role| with_permissions(role, &by_role))
            .collect();

        let mut roles_by_group: BTreeMap<i64, Vec<RolePermissions>> = BTreeMap::new();
        for role in group_roles {
            if let Some(group_id) = role.group_id {
                roles_by_group
                    .entry(group_id.as_i64())
                    .or_default()
                    .push(with_permissions(role, &by_role));
            }
        }
        let through_groups = groups
            .into_iter()
            .map(|group| {
                let roles = roles_by_group
                    .remove(&group.id.as_i64())
                    .unwrap_or_default();
                GroupPermissions { group, roles }
            })
            .collect();

        Ok(PermissionBreakdown {
            direct,
            through_roles,
            through_groups,
        })
    }

    async fn has_direct_permission(&self, employee_id: EmployeeId, slug: &str) -> AppResult<bool> {
        let sql = format!(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM rbac_assignments a
                JOIN rbac_permissions p
                  ON p.id = a.assignable_id AND p.deleted_at IS NULL
                WHERE a.employee_id = $1
                  AND a.assignable_type = 'permission'
                  AND p.slug = $2
                  AND {CURRENT_ASSIGNMENT}
            )
            "#
        );
        self.exists(&sql, employee_id, slug).await
    }

    async fn has_role_permission(&self, employee_id: EmployeeId, slug: &str) -> AppResult<bool> {
        let sql = format!(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM rbac_assignments a
                JOIN rbac_roles r ON r.id = a.assignable_id AND r.deleted_at IS NULL
                JOIN rbac_role_permissions rp ON rp.role_id = r.id
                JOIN rbac_permissions p
                  ON p.id = rp.permission_id AND p.deleted_at IS NULL
                WHERE a.employee_id = $1
                  AND a.assignable_type = 'role'
                  AND p.slug = $2
                  AND {CURRENT_ASSIGNMENT}
            )
            "#
        );
        self.exists(&sql, employee_id, slug).await
    }

    async fn has_group_role_permission(
        &self,
        employee_id: EmployeeId,
        slug: &str,
    ) -> AppResult<bool> {
        let sql = format!(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM rbac_assignments a
                JOIN rbac_groups g ON g.id = a.assignable_id AND g.deleted_at IS NULL
                JOIN rbac_roles r ON r.group_id = g.id AND r.deleted_at IS NULL
                JOIN rbac_role_permissions rp ON rp.role_id = r.id
                JOIN rbac_permissions p
                  ON p.id = rp.permission_id AND p.deleted_at IS NULL
                WHERE a.employee_id = $1
                  AND a.assignable_type = 'group'
                  AND p.slug = $2
                  AND {CURRENT_ASSIGNMENT}
            )
            "#
        );
        self.exists(&sql, employee_id, slug).await
    }
}
