use super::*;

use chrono::{DateTime, Utc};

impl AssignmentService {
    /// Grants an entity to an employee.
    ///
    /// A stale expired row for the same pair is retired first; a current one
    /// fails with `DuplicateActiveAssignment`.
    pub async fn assign(&self, input: NewAssignment) -> AppResult<Assignment> {
        let employee = self.load_employee(input.employee_id).await?;
        self.grant(&employee, input).await
    }

    /// Revokes the current assignment for a pair.
    ///
    /// Returns `None` when nothing was held; repeated calls are no-ops.
    pub async fn unassign(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
        reason: Option<String>,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Option<Assignment>> {
        self.revoke(employee_id, assignable, reason, changed_by)
            .await
    }

    /// Moves the expiry of a current assignment to `days` days from now.
    pub async fn extend(
        &self,
        assignment_id: AssignmentId,
        days: u32,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Assignment> {
        if days == 0 {
            return Err(AppError::Validation(
                "extension must be at least one day".to_owned(),
            ));
        }

        let assignment = self
            .assignments
            .extend_assignment(assignment_id, days, changed_by)
            .await?;
        self.resolver.invalidate(assignment.employee_id).await;

        info!(
            assignment_id = %assignment_id,
            days,
            "assignment extended"
        );
        self.record_audit(AuditEvent {
            actor: changed_by,
            action: AuditAction::AssignmentExtended,
            resource_type: "rbac_assignment".to_owned(),
            resource_id: assignment_id.to_string(),
            detail: Some(format!("extended by {days} days")),
        })
        .await;

        Ok(assignment)
    }

    /// Deactivates every assignment whose expiry is at or before `now`.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> AppResult<Vec<Assignment>> {
        let expired = self.assignments.deactivate_due_assignments(now).await?;
        if expired.is_empty() {
            return Ok(expired);
        }

        self.resolver
            .invalidate_many(expired.iter().map(|assignment| assignment.employee_id))
            .await;

        info!(count = expired.len(), "expired assignments deactivated");
        self.record_audit(AuditEvent {
            actor: None,
            action: AuditAction::AssignmentsExpired,
            resource_type: "rbac_assignment".to_owned(),
            resource_id: "sweep".to_owned(),
            detail: Some(format!("deactivated {} expired assignments", expired.len())),
        })
        .await;

        Ok(expired)
    }

    /// Returns the history of one assignment, oldest first.
    pub async fn history(
        &self,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<AssignmentHistoryEntry>> {
        if self
            .assignments
            .find_assignment(assignment_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound(format!(
                "assignment {assignment_id} not found"
            )));
        }

        self.assignments.list_history(assignment_id).await
    }

    /// Lists the employee's current assignments.
    pub async fn list_active_assignments(
        &self,
        employee_id: EmployeeId,
    ) -> AppResult<Vec<Assignment>> {
        self.assignments
            .list_employee_assignments(employee_id, true)
            .await
    }
}
