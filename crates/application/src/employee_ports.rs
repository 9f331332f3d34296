use async_trait::async_trait;

use adrbac_core::{AppResult, DirectoryIdentity, EmployeeId};
use adrbac_domain::{Employee, EmployeeRecord};

/// Repository port for mirrored employee rows.
#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    /// Finds a non-deleted employee by id.
    async fn find_employee(&self, employee_id: EmployeeId) -> AppResult<Option<Employee>>;

    /// Finds a non-deleted employee by directory account name.
    async fn find_employee_by_username(&self, username: &str) -> AppResult<Option<Employee>>;

    /// Inserts or refreshes an employee from an HR record and stamps `synced_at`.
    async fn upsert_employee(&self, record: EmployeeRecord) -> AppResult<Employee>;

    /// Stamps `last_login_at`.
    async fn record_login(&self, employee_id: EmployeeId) -> AppResult<()>;

    /// Marks an employee inactive. Returns the updated row when one existed.
    async fn deactivate_employee(&self, username: &str) -> AppResult<Option<Employee>>;
}

/// Directory credential check, delegated to an external service.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns whether the credentials are accepted by the directory.
    async fn authenticate(&self, username: &str, password: &str) -> AppResult<bool>;

    /// Returns directory account details for an authenticated user.
    async fn user_details(&self, username: &str) -> AppResult<DirectoryIdentity>;
}

/// External HR data source.
#[async_trait]
pub trait EmployeeSource: Send + Sync {
    /// Fetches one employee record. `None` when the source does not know the
    /// username.
    async fn fetch(&self, username: &str) -> AppResult<Option<EmployeeRecord>>;
}
