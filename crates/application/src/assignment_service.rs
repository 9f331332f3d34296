use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use adrbac_core::{AppError, AppResult, AssignmentId, EmployeeId};
use adrbac_domain::{
    AssignableRef, AssignableType, Assignment, AssignmentHistoryEntry, AuditAction, Employee,
};

use crate::{
    AssignManyOutcome, AssignmentRepository, AssignmentRequest, AttachOutcome, AuditEvent,
    AuditSink, BulkAssignOutcome, CatalogRepository, EmployeeRepository, GrantOptions,
    ItemFailure, NewAssignment, PermissionResolver, SyncOutcome, UnassignManyOutcome,
};

mod batch;
mod lifecycle;
mod sync;

/// Application service for granting, revoking and synchronising assignments.
///
/// Every successful mutation invalidates the affected employee's cached
/// permission set after the store has committed.
#[derive(Clone)]
pub struct AssignmentService {
    assignments: Arc<dyn AssignmentRepository>,
    employees: Arc<dyn EmployeeRepository>,
    catalog: Arc<dyn CatalogRepository>,
    resolver: PermissionResolver,
    audit_sink: Arc<dyn AuditSink>,
}

impl AssignmentService {
    /// Creates a service from repository implementations and a resolver.
    #[must_use]
    pub fn new(
        assignments: Arc<dyn AssignmentRepository>,
        employees: Arc<dyn EmployeeRepository>,
        catalog: Arc<dyn CatalogRepository>,
        resolver: PermissionResolver,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            assignments,
            employees,
            catalog,
            resolver,
            audit_sink,
        }
    }

    async fn load_employee(&self, employee_id: EmployeeId) -> AppResult<Employee> {
        self.employees
            .find_employee(employee_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("employee {employee_id} not found")))
    }

    async fn ensure_assignable_exists(&self, assignable: AssignableRef) -> AppResult<()> {
        let exists = match assignable {
            AssignableRef::Group(group_id) => self.catalog.find_group(group_id).await?.is_some(),
            AssignableRef::Role(role_id) => self.catalog.find_role(role_id).await?.is_some(),
            AssignableRef::Permission(permission_id) => self
                .catalog
                .find_permission(permission_id)
                .await?
                .is_some(),
        };

        if exists {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "{} {} not found",
                assignable.assignable_type(),
                assignable.raw_id()
            )))
        }
    }

    async fn grant(&self, employee: &Employee, input: NewAssignment) -> AppResult<Assignment> {
        if !employee.is_enabled() {
            return Err(AppError::Validation(format!(
                "employee '{}' is inactive",
                employee.username
            )));
        }
        if let Some(expires_at) = input.expires_at
            && expires_at <= Utc::now()
        {
            return Err(AppError::Validation(format!(
                "expiry {expires_at} is not in the future"
            )));
        }
        self.ensure_assignable_exists(input.assignable).await?;

        let assignment = self.assignments.create_assignment(input).await?;
        self.resolver.invalidate(assignment.employee_id).await;

        info!(
            employee_id = %assignment.employee_id,
            assignable = %assignment.assignable,
            assignment_id = %assignment.id,
            "assignment created"
        );
        self.record_audit(AuditEvent {
            actor: assignment.assigned_by,
            action: AuditAction::AssignmentCreated,
            resource_type: "rbac_assignment".to_owned(),
            resource_id: assignment.id.to_string(),
            detail: Some(format!(
                "assigned {} to employee {}",
                assignment.assignable, assignment.employee_id
            )),
        })
        .await;

        Ok(assignment)
    }

    async fn revoke(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
        reason: Option<String>,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Option<Assignment>> {
        let Some(assignment) = self
            .assignments
            .deactivate_assignment(employee_id, assignable, reason.clone(), changed_by)
            .await?
        else {
            return Ok(None);
        };
        self.resolver.invalidate(employee_id).await;

        info!(
            employee_id = %employee_id,
            assignable = %assignable,
            assignment_id = %assignment.id,
            "assignment deactivated"
        );
        self.record_audit(AuditEvent {
            actor: changed_by,
            action: AuditAction::AssignmentDeactivated,
            resource_type: "rbac_assignment".to_owned(),
            resource_id: assignment.id.to_string(),
            detail: Some(format!(
                "revoked {assignable} from employee {employee_id}: {}",
                reason.as_deref().unwrap_or("no reason provided")
            )),
        })
        .await;

        Ok(Some(assignment))
    }

    // Runs after commit; audit failures never fail the mutation.
    async fn record_audit(&self, event: AuditEvent) {
        let action = event.action;
        if let Err(error) = self.audit_sink.record(event).await {
            warn!(action = action.as_str(), error = %error, "failed to record audit event");
        }
    }
}
