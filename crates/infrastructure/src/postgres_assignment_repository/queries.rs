use super::*;

impl PostgresAssignmentRepository {
    pub(super) async fn find_active_assignment_impl(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
    ) -> AppResult<Option<Assignment>> {
        let sql = format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM rbac_assignments
            WHERE employee_id = $1
              AND assignable_type = $2
              AND assignable_id = $3
              AND {CURRENT_PREDICATE}
            "#
        );
        sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(employee_id.as_i64())
            .bind(assignable.assignable_type().as_str())
            .bind(assignable.raw_id())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to find assignment: {error}")))?
            .map(Assignment::try_from)
            .transpose()
    }

    pub(super) async fn find_assignment_impl(
        &self,
        assignment_id: AssignmentId,
    ) -> AppResult<Option<Assignment>> {
        let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM rbac_assignments WHERE id = $1");
        sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(assignment_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to find assignment: {error}")))?
            .map(Assignment::try_from)
            .transpose()
    }

    pub(super) async fn list_employee_assignments_impl(
        &self,
        employee_id: EmployeeId,
        current_only: bool,
    ) -> AppResult<Vec<Assignment>> {
        let sql = format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM rbac_assignments
            WHERE employee_id = $1
              AND (NOT $2 OR ({CURRENT_PREDICATE}))
            ORDER BY assigned_at, id
            "#
        );
        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(employee_id.as_i64())
            .bind(current_only)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to list assignments for employee {employee_id}: {error}"
                ))
            })?;

        into_assignments(rows)
    }

    pub(super) async fn list_history_impl(
        &self,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<AssignmentHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, assignment_id, action, changes, changed_by, recorded_at
            FROM rbac_assignment_history
            WHERE assignment_id = $1
            ORDER BY id
            "#,
        )
        .bind(assignment_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list assignment history: {error}"))
        })?;

        rows.into_iter()
            .map(AssignmentHistoryEntry::try_from)
            .collect()
    }

    pub(super) async fn list_holders_impl(
        &self,
        assignable: AssignableRef,
    ) -> AppResult<Vec<EmployeeId>> {
        let sql = format!(
            r#"
            SELECT DISTINCT employee_id
            FROM rbac_assignments
            WHERE assignable_type = $1
              AND assignable_id = $2
              AND {CURRENT_PREDICATE}
            ORDER BY employee_id
            "#
        );
        let holders = sqlx::query_scalar::<_, i64>(&sql)
            .bind(assignable.assignable_type().as_str())
            .bind(assignable.raw_id())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to list holders of {assignable}: {error}"))
            })?;

        Ok(holders.into_iter().map(EmployeeId::new).collect())
    }

    pub(super) async fn assignment_counts_impl(&self) -> AppResult<AssignmentCounts> {
        let (total, active, expired, inactive) = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE is_active AND (expires_at IS NULL OR expires_at > now())),
                COUNT(*) FILTER (WHERE is_active AND expires_at <= now()),
                COUNT(*) FILTER (WHERE NOT is_active)
            FROM rbac_assignments
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count assignments: {error}")))?;

        let by_type_rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT assignable_type, COUNT(*)
            FROM rbac_assignments
            GROUP BY assignable_type
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count assignments by type: {error}"))
        })?;

        let mut counts = AssignmentCounts {
            total: count(total),
            active: count(active),
            expired: count(expired),
            inactive: count(inactive),
            ..AssignmentCounts::default()
        };
        for (assignable_type, rows) in by_type_rows {
            counts.by_type.insert(
                AssignableType::from_str(assignable_type.as_str())?,
                count(rows),
            );
        }

        Ok(counts)
    }

    pub(super) async fn list_expiring_impl(&self, days_ahead: u32) -> AppResult<Vec<Assignment>> {
        let days = i32::try_from(days_ahead).map_err(|_| {
            AppError::Validation(format!("{days_ahead} days exceeds supported range"))
        })?;
        let sql = format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS}
            FROM rbac_assignments
            WHERE {CURRENT_PREDICATE}
              AND expires_at IS NOT NULL
              AND expires_at <= now() + make_interval(days => $1)
            ORDER BY expires_at, id
            "#
        );
        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(days)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to list expiring assignments: {error}"))
            })?;

        into_assignments(rows)
    }
}
