use super::*;

use adrbac_domain::EXPIRED_REASON;

impl PostgresAssignmentRepository {
    pub(super) async fn create_assignment_impl(
        &self,
        input: NewAssignment,
    ) -> AppResult<Assignment> {
        let mut transaction = self.begin().await?;
        lock_pair(&mut transaction, input.employee_id, input.assignable).await?;
        retire_stale(&mut transaction, input.employee_id, input.assignable).await?;

        let current_sql = format!(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM rbac_assignments
                WHERE employee_id = $1
                  AND assignable_type = $2
                  AND assignable_id = $3
                  AND {CURRENT_PREDICATE}
            )
            "#
        );
        let already_held = sqlx::query_scalar::<_, bool>(&current_sql)
            .bind(input.employee_id.as_i64())
            .bind(input.assignable.assignable_type().as_str())
            .bind(input.assignable.raw_id())
            .fetch_one(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to check existing assignment: {error}"))
            })?;
        if already_held {
            return Err(AppError::DuplicateActiveAssignment(format!(
                "employee {} already holds {}",
                input.employee_id, input.assignable
            )));
        }

        let insert_sql = format!(
            r#"
            INSERT INTO rbac_assignments (
                employee_id,
                assignable_type,
                assignable_id,
                reason,
                assigned_by,
                expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AssignmentRow>(&insert_sql)
            .bind(input.employee_id.as_i64())
            .bind(input.assignable.assignable_type().as_str())
            .bind(input.assignable.raw_id())
            .bind(input.reason.as_deref())
            .bind(input.assigned_by.map(|id| id.as_i64()))
            .bind(input.expires_at)
            .fetch_one(&mut *transaction)
            .await
            .map_err(|error| duplicate_or_internal(error, &input))?;
        let assignment = Assignment::try_from(row)?;

        append_history(
            &mut transaction,
            assignment.id,
            AssignmentChange::created(
                input.reason.as_deref(),
                input.expires_at,
                input.assigned_by,
            ),
        )
        .await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(assignment)
    }

    pub(super) async fn deactivate_expired_assignment_impl(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
    ) -> AppResult<Option<Assignment>> {
        let mut transaction = self.begin().await?;
        lock_pair(&mut transaction, employee_id, assignable).await?;
        let retired = retire_stale(&mut transaction, employee_id, assignable).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(retired)
    }

    pub(super) async fn deactivate_assignment_impl(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
        reason: Option<String>,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Option<Assignment>> {
        let mut transaction = self.begin().await?;
        lock_pair(&mut transaction, employee_id, assignable).await?;

        let sql = format!(
            r#"
            UPDATE rbac_assignments
            SET is_active = FALSE,
                reason = COALESCE($4, reason),
                updated_at = now()
            WHERE employee_id = $1
              AND assignable_type = $2
              AND assignable_id = $3
              AND {CURRENT_PREDICATE}
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(employee_id.as_i64())
            .bind(assignable.assignable_type().as_str())
            .bind(assignable.raw_id())
            .bind(reason.as_deref())
            .fetch_optional(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to deactivate assignment: {error}"))
            })?;

        let deactivated = match row {
            Some(row) => {
                let assignment = Assignment::try_from(row)?;
                append_history(
                    &mut transaction,
                    assignment.id,
                    AssignmentChange::deactivated(reason.as_deref(), changed_by),
                )
                .await?;
                Some(assignment)
            }
            None => None,
        };

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(deactivated)
    }

    pub(super) async fn extend_assignment_impl(
        &self,
        assignment_id: AssignmentId,
        days: u32,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Assignment> {
        let days_i32 = i32::try_from(days).map_err(|_| {
            AppError::Validation(format!("extension of {days} days exceeds supported range"))
        })?;
        let mut transaction = self.begin().await?;

        let select_sql = format!(
            r#"
            SELECT expires_at, ({CURRENT_PREDICATE}) AS is_current
            FROM rbac_assignments
            WHERE id = $1
            FOR UPDATE
            "#
        );
        let existing = sqlx::query_as::<_, ExpiryRow>(&select_sql)
            .bind(assignment_id.as_i64())
            .fetch_optional(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to load assignment: {error}")))?
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;
        if !existing.is_current {
            return Err(AppError::Validation(format!(
                "assignment {assignment_id} is not active"
            )));
        }
        let old_expiry = existing.expires_at;

        let update_sql = format!(
            r#"
            UPDATE rbac_assignments
            SET expires_at = now() + make_interval(days => $2),
                updated_at = now()
            WHERE id = $1
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AssignmentRow>(&update_sql)
            .bind(assignment_id.as_i64())
            .bind(days_i32)
            .fetch_one(&mut *transaction)
            .await
            .map_err(|error| AppError::Internal(format!("failed to extend assignment: {error}")))?;
        let assignment = Assignment::try_from(row)?;
        let new_expiry = assignment.expires_at.ok_or_else(|| {
            AppError::Internal(format!("assignment {assignment_id} lost its expiry"))
        })?;

        append_history(
            &mut transaction,
            assignment_id,
            AssignmentChange::extended(old_expiry, new_expiry, days, changed_by),
        )
        .await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(assignment)
    }

    pub(super) async fn deactivate_due_assignments_impl(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Assignment>> {
        let mut transaction = self.begin().await?;

        let sql = format!(
            r#"
            UPDATE rbac_assignments
            SET is_active = FALSE, updated_at = now()
            WHERE is_active
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(now)
            .fetch_all(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to deactivate expired assignments: {error}"))
            })?;
        let expired = into_assignments(rows)?;

        for assignment in &expired {
            append_history(
                &mut transaction,
                assignment.id,
                AssignmentChange::deactivated(Some(EXPIRED_REASON), None),
            )
            .await?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(expired)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExpiryRow {
    expires_at: Option<DateTime<Utc>>,
    is_current: bool,
}

/// Deactivates an expired row still flagged active for the pair. Caller
/// holds the pair lock.
async fn retire_stale(
    transaction: &mut Transaction<'_, Postgres>,
    employee_id: EmployeeId,
    assignable: AssignableRef,
) -> AppResult<Option<Assignment>> {
    let sql = format!(
        r#"
        UPDATE rbac_assignments
        SET is_active = FALSE, updated_at = now()
        WHERE employee_id = $1
          AND assignable_type = $2
          AND assignable_id = $3
          AND is_active
          AND expires_at IS NOT NULL
          AND expires_at <= now()
        RETURNING {ASSIGNMENT_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, AssignmentRow>(&sql)
        .bind(employee_id.as_i64())
        .bind(assignable.assignable_type().as_str())
        .bind(assignable.raw_id())
        .fetch_optional(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to retire expired assignment: {error}"))
        })?;

    let Some(row) = row else {
        return Ok(None);
    };
    let retired = Assignment::try_from(row)?;
    append_history(
        transaction,
        retired.id,
        AssignmentChange::deactivated(Some(EXPIRED_REASON), None),
    )
    .await?;

    Ok(Some(retired))
}
