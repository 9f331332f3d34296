use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use adrbac_application::EmployeeRepository;
use adrbac_core::{AppError, AppResult, EmployeeId};
use adrbac_domain::{Employee, EmployeeRecord};

/// PostgreSQL implementation of the employee repository port.
#[derive(Clone)]
pub struct PostgresEmployeeRepository {
    pool: PgPool,
}

impl PostgresEmployeeRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const EMPLOYEE_COLUMNS: &str = "id, username, employee_number, email, first_name, last_name, \
     department, position, is_active, last_login_at, synced_at, deleted_at";

#[derive(Debug, sqlx::FromRow)]
struct EmployeeRow {
    id: i64,
    username: String,
    employee_number: Option<String>,
    email: String,
    first_name: String,
    last_name: String,
    department: Option<String>,
    position: Option<String>,
    is_active: bool,
    last_login_at: Option<DateTime<Utc>>,
    synced_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<EmployeeRow> for Employee {
    fn from(row: EmployeeRow) -> Self {
        Self {
            id: EmployeeId::new(row.id),
            username: row.username,
            employee_number: row.employee_number,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            department: row.department,
            position: row.position,
            is_active: row.is_active,
            last_login_at: row.last_login_at,
            synced_at: row.synced_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[async_trait]
impl EmployeeRepository for PostgresEmployeeRepository {
    async fn find_employee(&self, employee_id: EmployeeId) -> AppResult<Option<Employee>> {
        let sql = format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(employee_id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to find employee: {error}")))?;

        Ok(row.map(Employee::from))
    }

    async fn find_employee_by_username(&self, username: &str) -> AppResult<Option<Employee>> {
        let sql = format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE username = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to find employee '{username}': {error}"))
            })?;

        Ok(row.map(Employee::from))
    }

    async fn upsert_employee(&self, record: EmployeeRecord) -> AppResult<Employee> {
        let sql = format!(
            r#"
            INSERT INTO employees (
                username,
                employee_number,
                email,
                first_name,
                last_name,
                department,
                position,
                is_active,
                synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
            ON CONFLICT (username) DO UPDATE
            SET employee_number = EXCLUDED.employee_number,
                email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                department = EXCLUDED.department,
                position = EXCLUDED.position,
                is_active = EXCLUDED.is_active,
                synced_at = now(),
                updated_at = now()
            RETURNING {EMPLOYEE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(record.username.as_str())
            .bind(record.employee_number.as_deref())
            .bind(record.email.as_str())
            .bind(record.first_name.as_str())
            .bind(record.last_name.as_str())
            .bind(record.department.as_deref())
            .bind(record.position.as_deref())
            .bind(record.is_active)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to upsert employee '{}': {error}",
                    record.username
                ))
            })?;

        Ok(Employee::from(row))
    }

    async fn record_login(&self, employee_id: EmployeeId) -> AppResult<()> {
        sqlx::query("UPDATE employees SET last_login_at = now(), updated_at = now() WHERE id = $1")
            .bind(employee_id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to record login: {error}")))?;

        Ok(())
    }

    async fn deactivate_employee(&self, username: &str) -> AppResult<Option<Employee>> {
        let sql = format!(
            r#"
            UPDATE employees
            SET is_active = FALSE, synced_at = now(), updated_at = now()
            WHERE username = $1 AND deleted_at IS NULL
            RETURNING {EMPLOYEE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, EmployeeRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to deactivate employee '{username}': {error}"))
            })?;

        Ok(row.map(Employee::from))
    }
}
