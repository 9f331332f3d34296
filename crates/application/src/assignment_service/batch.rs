use super::*;

impl AssignmentService {
    /// Grants several entities to one employee.
    ///
    /// Entities already held are skipped; per-item failures are collected
    /// without aborting the rest.
    pub async fn assign_many(
        &self,
        employee_id: EmployeeId,
        request: &AssignmentRequest,
        options: &GrantOptions,
    ) -> AppResult<AssignManyOutcome> {
        let employee = self.load_employee(employee_id).await?;
        let mut outcome = AssignManyOutcome::default();

        for assignable in request.refs() {
            match self
                .assignments
                .find_active_assignment(employee_id, assignable)
                .await
            {
                Ok(Some(_)) => {
                    outcome.skipped.push(assignable);
                    continue;
                }
                Ok(None) => {}
                Err(error) => {
                    outcome.failed.push(failure(assignable, &error));
                    continue;
                }
            }

            match self
                .grant(&employee, options.grant(employee_id, assignable))
                .await
            {
                Ok(assignment) => outcome.success.push(assignment),
                Err(AppError::DuplicateActiveAssignment(_)) => outcome.skipped.push(assignable),
                Err(error) => {
                    warn!(
                        employee_id = %employee_id,
                        assignable = %assignable,
                        error = %error,
                        "failed to assign"
                    );
                    outcome.failed.push(failure(assignable, &error));
                }
            }
        }

        Ok(outcome)
    }

    /// Revokes several entities from one employee.
    ///
    /// Entities the employee does not hold are reported as failures.
    pub async fn unassign_many(
        &self,
        employee_id: EmployeeId,
        request: &AssignmentRequest,
        reason: Option<String>,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<UnassignManyOutcome> {
        let mut outcome = UnassignManyOutcome::default();

        for assignable in request.refs() {
            let revoked = match self.ensure_assignable_exists(assignable).await {
                Ok(()) => {
                    self.revoke(employee_id, assignable, reason.clone(), changed_by)
                        .await
                }
                Err(error) => Err(error),
            };

            match revoked {
                Ok(Some(assignment)) => outcome.success.push(assignment),
                Ok(None) => outcome.failed.push(ItemFailure {
                    assignable,
                    error: "no active assignment found".to_owned(),
                }),
                Err(error) => {
                    warn!(
                        employee_id = %employee_id,
                        assignable = %assignable,
                        error = %error,
                        "failed to unassign"
                    );
                    outcome.failed.push(failure(assignable, &error));
                }
            }
        }

        Ok(outcome)
    }

    /// Grants the same entities to several employees.
    ///
    /// Each employee is processed independently; one employee's failure does
    /// not affect another's grants.
    pub async fn bulk_assign(
        &self,
        employee_ids: &[EmployeeId],
        request: &AssignmentRequest,
        options: &GrantOptions,
    ) -> BulkAssignOutcome {
        let mut outcome = BulkAssignOutcome::default();

        for employee_id in employee_ids.iter().copied() {
            match self.assign_many(employee_id, request, options).await {
                Ok(result) => {
                    outcome.success.insert(employee_id, result);
                }
                Err(error) => {
                    warn!(employee_id = %employee_id, error = %error, "bulk assignment skipped employee");
                    outcome.errors.insert(employee_id, error.to_string());
                }
            }
        }

        outcome
    }
}

pub(super) fn failure(assignable: AssignableRef, error: &AppError) -> ItemFailure {
    ItemFailure {
        assignable,
        error: error.to_string(),
    }
}
