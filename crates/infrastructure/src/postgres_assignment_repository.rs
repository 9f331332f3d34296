//! PostgreSQL-backed assignment repository.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use adrbac_application::{AssignmentCounts, AssignmentRepository, NewAssignment};
use adrbac_core::{AppError, AppResult, AssignmentId, EmployeeId};
use adrbac_domain::{
    AssignableRef, AssignableType, Assignment, AssignmentChange, AssignmentHistoryAction,
    AssignmentHistoryEntry,
};

mod lifecycle;
mod queries;


/// PostgreSQL implementation of the assignment repository port.
///
/// Check-then-act sequences on one `(employee, type, id)` triple run under a
/// transaction-scoped advisory lock keyed by the triple.
#[derive(Clone)]
pub struct PostgresAssignmentRepository {
    pool: PgPool,
}

impl PostgresAssignmentRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))
    }
}

const ASSIGNMENT_COLUMNS: &str = "id, employee_id, assignable_type, assignable_id, reason, \
     assigned_by, assigned_at, expires_at, is_active";

const CURRENT_PREDICATE: &str = "is_active AND (expires_at IS NULL OR expires_at > now())";

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: i64,
    employee_id: i64,
    assignable_type: String,
    assignable_id: i64,
    reason: Option<String>,
    assigned_by: Option<i64>,
    assigned_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = AppError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        let assignable_type = AssignableType::from_str(row.assignable_type.as_str())?;
        Ok(Self {
            id: AssignmentId::new(row.id),
            employee_id: EmployeeId::new(row.employee_id),
            assignable: AssignableRef::from_parts(assignable_type, row.assignable_id),
            reason: row.reason,
            assigned_by: row.assigned_by.map(EmployeeId::new),
            assigned_at: row.assigned_at,
            expires_at: row.expires_at,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    assignment_id: i64,
    action: String,
    changes: serde_json::Value,
    changed_by: Option<i64>,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for AssignmentHistoryEntry {
    type Error = AppError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            assignment_id: AssignmentId::new(row.assignment_id),
            action: AssignmentHistoryAction::from_str(row.action.as_str())?,
            changes: row.changes,
            changed_by: row.changed_by.map(EmployeeId::new),
            recorded_at: row.recorded_at,
        })
    }
}

fn into_assignments(rows: Vec<AssignmentRow>) -> AppResult<Vec<Assignment>> {
    rows.into_iter().map(Assignment::try_from).collect()
}

/// Serialises writers on one `(employee, type, id)` triple until commit.
async fn lock_pair(
    transaction: &mut Transaction<'_, Postgres>,
    employee_id: EmployeeId,
    assignable: AssignableRef,
) -> AppResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("rbac_assignment:{employee_id}:{assignable}"))
        .execute(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to lock assignment {assignable}: {error}"))
        })?;

    Ok(())
}

async fn append_history(
    transaction: &mut Transaction<'_, Postgres>,
    assignment_id: AssignmentId,
    change: AssignmentChange,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO rbac_assignment_history (assignment_id, action, changes, changed_by)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(assignment_id.as_i64())
    .bind(change.action.as_str())
    .bind(&change.changes)
    .bind(change.changed_by.map(|id| id.as_i64()))
    .execute(&mut **transaction)
    .await
    .map_err(|error| {
        AppError::Internal(format!(
            "failed to append history for assignment {assignment_id}: {error}"
        ))
    })?;

    Ok(())
}

fn duplicate_or_internal(error: sqlx::Error, input: &NewAssignment) -> AppError {
    if let sqlx::Error::Database(ref database_error) = error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::DuplicateActiveAssignment(format!(
            "employee {} already holds {}",
            input.employee_id, input.assignable
        ));
    }

    AppError::Internal(format!("failed to create assignment: {error}"))
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

#[async_trait]
impl AssignmentRepository for PostgresAssignmentRepository {
    async fn create_assignment(&self, input: NewAssignment) -> AppResult<Assignment> {
        self.create_assignment_impl(input).await
    }

    async fn find_active_assignment(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
    ) -> AppResult<Option<Assignment>> {
        self.find_active_assignment_impl(employee_id, assignable)
            .await
    }

    async fn deactivate_expired_assignment(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
    ) -> AppResult<Option<Assignment>> {
        self.deactivate_expired_assignment_impl(employee_id, assignable)
            .await
    }

    async fn deactivate_assignment(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
        reason: Option<String>,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Option<Assignment>> {
        self.deactivate_assignment_impl(employee_id, assignable, reason, changed_by)
            .await
    }

    async fn extend_assignment(
        &self,
        assignment_id: AssignmentId,
        days: u32,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Assignment> {
        self.extend_assignment_impl(assignment_id, days, changed_by)
            .await
    }

    async fn find_assignment(&self, assignment_id: AssignmentId) -> AppResult<Option<Assignment>> {
        self.find_assignment_impl(assignment_id).await
    }

    async fn list_employee_assignments(
        &self,
        employee_id: EmployeeId,
        current_only: bool,
    ) -> AppResult<Vec<Assignment>> {
        self.list_employee_assignments_impl(employee_id, current_only)
            .await
    }

    async fn deactivate_due_assignments(&self, now: DateTime<Utc>) -> AppResult<Vec<Assignment>> {
        self.deactivate_due_assignments_impl(now).await
    }

    async fn list_history(
        &self,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<AssignmentHistoryEntry>> {
        self.list_history_impl(assignment_id).await
    }

    async fn list_holders(&self, assignable: AssignableRef) -> AppResult<Vec<EmployeeId>> {
        self.list_holders_impl(assignable).await
    }

    async fn assignment_counts(&self) -> AppResult<AssignmentCounts> {
        self.assignment_counts_impl().await
    }

    async fn list_expiring(&self, days_ahead: u32) -> AppResult<Vec<Assignment>> {
        self.list_expiring_impl(days_ahead).await
    }
}
