use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use adrbac_core::{AppError, AppResult, DirectoryIdentity};
use adrbac_domain::{AuditAction, EffectivePermissionSet, Employee, EmployeeRecord};

use crate::{
    AuditEvent, AuditSink, Authenticator, EmployeeRepository, EmployeeSource, PermissionResolver,
};

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Refreshed employee row.
    pub employee: Employee,
    /// Directory account details.
    pub identity: DirectoryIdentity,
    /// Effective permission slugs.
    pub permissions: EffectivePermissionSet,
    /// Slugs of the roles the employee holds directly.
    pub roles: Vec<String>,
}

/// Application service for directory-backed login.
#[derive(Clone)]
pub struct AuthService {
    authenticator: Arc<dyn Authenticator>,
    source: Arc<dyn EmployeeSource>,
    employees: Arc<dyn EmployeeRepository>,
    resolver: PermissionResolver,
    audit_sink: Arc<dyn AuditSink>,
}

impl AuthService {
    /// Creates a login service.
    #[must_use]
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        source: Arc<dyn EmployeeSource>,
        employees: Arc<dyn EmployeeRepository>,
        resolver: PermissionResolver,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            authenticator,
            source,
            employees,
            resolver,
            audit_sink,
        }
    }

    /// Authenticates against the directory and refreshes the employee from
    /// the HR source.
    ///
    /// When the HR source is unreachable the local row is used as is.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<LoginOutcome> {
        let username = username.trim();
        if !self.authenticator.authenticate(username, password).await? {
            return Err(AppError::Unauthorized("invalid credentials".to_owned()));
        }

        let employee = match self.source.fetch(username).await {
            Ok(Some(record)) => refresh(self.employees.as_ref(), record).await?,
            Ok(None) => self.local_employee(username).await?,
            Err(error) => {
                warn!(username, error = %error, "employee source unavailable during login");
                self.local_employee(username).await?
            }
        };
        if !employee.is_enabled() {
            return Err(AppError::Forbidden(format!(
                "employee '{username}' is inactive"
            )));
        }

        let identity = self.authenticator.user_details(username).await?;
        self.employees.record_login(employee.id).await?;
        let permissions = self.resolver.effective_permissions(employee.id).await?;
        let roles = self
            .resolver
            .permission_breakdown(employee.id)
            .await?
            .through_roles
            .into_iter()
            .map(|entry| entry.role.slug)
            .collect();

        info!(employee_id = %employee.id, "employee logged in");
        record_audit(
            self.audit_sink.as_ref(),
            AuditEvent {
                actor: Some(employee.id),
                action: AuditAction::EmployeeLoggedIn,
                resource_type: "employee".to_owned(),
                resource_id: employee.id.to_string(),
                detail: Some(format!("'{}' logged in", identity.display_name())),
            },
        )
        .await;

        Ok(LoginOutcome {
            employee,
            identity,
            permissions,
            roles,
        })
    }

    async fn local_employee(&self, username: &str) -> AppResult<Employee> {
        self.employees
            .find_employee_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("employee '{username}' not found")))
    }
}

/// What a sync did to one employee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmployeeSyncResult {
    /// The row was inserted or refreshed from the source.
    Refreshed(Employee),
    /// The source no longer knows the employee and the row was deactivated.
    Deactivated(Employee),
    /// Neither the source nor the local store knows the username.
    Unknown,
}

/// Per-username results of a batch sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmployeeSyncReport {
    /// Usernames that synced.
    pub results: BTreeMap<String, EmployeeSyncResult>,
    /// Usernames that failed, with the error message.
    pub errors: BTreeMap<String, String>,
}

/// Application service mirroring the HR source into the employee store.
#[derive(Clone)]
pub struct EmployeeSyncService {
    source: Arc<dyn EmployeeSource>,
    employees: Arc<dyn EmployeeRepository>,
    resolver: PermissionResolver,
    audit_sink: Arc<dyn AuditSink>,
}

impl EmployeeSyncService {
    /// Creates a sync service.
    #[must_use]
    pub fn new(
        source: Arc<dyn EmployeeSource>,
        employees: Arc<dyn EmployeeRepository>,
        resolver: PermissionResolver,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            source,
            employees,
            resolver,
            audit_sink,
        }
    }

    /// Refreshes one employee. Employees missing from the source are
    /// deactivated, never deleted.
    pub async fn sync(&self, username: &str) -> AppResult<EmployeeSyncResult> {
        let username = username.trim();
        let Some(record) = self.source.fetch(username).await? else {
            let Some(employee) = self.employees.deactivate_employee(username).await? else {
                return Ok(EmployeeSyncResult::Unknown);
            };

            self.resolver.invalidate(employee.id).await;
            info!(employee_id = %employee.id, "employee deactivated by sync");
            record_audit(
                self.audit_sink.as_ref(),
                AuditEvent {
                    actor: None,
                    action: AuditAction::EmployeeDeactivated,
                    resource_type: "employee".to_owned(),
                    resource_id: employee.id.to_string(),
                    detail: Some(format!("'{username}' missing from employee source")),
                },
            )
            .await;
            return Ok(EmployeeSyncResult::Deactivated(employee));
        };

        let employee = refresh(self.employees.as_ref(), record).await?;
        record_audit(
            self.audit_sink.as_ref(),
            AuditEvent {
                actor: None,
                action: AuditAction::EmployeeSynced,
                resource_type: "employee".to_owned(),
                resource_id: employee.id.to_string(),
                detail: None,
            },
        )
        .await;

        Ok(EmployeeSyncResult::Refreshed(employee))
    }

    /// Syncs each username independently.
    pub async fn sync_many<S: AsRef<str>>(&self, usernames: &[S]) -> EmployeeSyncReport {
        let mut report = EmployeeSyncReport::default();
        for username in usernames {
            let username = username.as_ref().trim();
            match self.sync(username).await {
                Ok(result) => {
                    report.results.insert(username.to_owned(), result);
                }
                Err(error) => {
                    warn!(username, error = %error, "employee sync failed");
                    report.errors.insert(username.to_owned(), error.to_string());
                }
            }
        }

        info!(
            synced = report.results.len(),
            failed = report.errors.len(),
            "employee sync finished"
        );
        report
    }
}

async fn refresh(employees: &dyn EmployeeRepository, record: EmployeeRecord) -> AppResult<Employee> {
    record.validate()?;
    employees.upsert_employee(record).await
}

async fn record_audit(audit_sink: &dyn AuditSink, event: AuditEvent) {
    let action = event.action;
    if let Err(error) = audit_sink.record(event).await {
        warn!(action = action.as_str(), error = %error, "failed to record audit event");
    }
}
