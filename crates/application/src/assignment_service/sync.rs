use super::*;

use std::collections::BTreeSet;

use super::batch::failure;

const SYNC_REMOVAL_REASON: &str = "sync removal";

impl AssignmentService {
    /// Grants every listed entity the employee does not already hold.
    ///
    /// Nothing is revoked. Failures are collected per id.
    pub async fn sync_without_detach(
        &self,
        employee_id: EmployeeId,
        assignable_type: AssignableType,
        ids: &[i64],
        options: &GrantOptions,
    ) -> AppResult<AttachOutcome> {
        let employee = self.load_employee(employee_id).await?;
        let held = self.held_of_type(employee_id, assignable_type).await?;
        let mut outcome = AttachOutcome::default();

        for assignable in unique_refs(assignable_type, ids) {
            if held.contains(&assignable) {
                continue;
            }
            match self
                .grant(&employee, options.grant(employee_id, assignable))
                .await
            {
                Ok(_) => outcome.added.push(assignable),
                Err(error) => {
                    warn!(
                        employee_id = %employee_id,
                        assignable = %assignable,
                        error = %error,
                        "sync failed to assign"
                    );
                    outcome.failed.push(failure(assignable, &error));
                }
            }
        }

        Ok(outcome)
    }

    /// Makes the employee's current assignments of one kind equal `ids`.
    ///
    /// Revokes held entities missing from `ids`, then grants listed entities
    /// not held. Each step is independent; failures are collected.
    pub async fn sync_with_detach(
        &self,
        employee_id: EmployeeId,
        assignable_type: AssignableType,
        ids: &[i64],
        options: &GrantOptions,
    ) -> AppResult<SyncOutcome> {
        let employee = self.load_employee(employee_id).await?;
        let held = self.held_of_type(employee_id, assignable_type).await?;
        let desired = unique_refs(assignable_type, ids);
        let desired_set: BTreeSet<AssignableRef> = desired.iter().copied().collect();
        let mut outcome = SyncOutcome::default();

        let removal_reason = options
            .reason
            .clone()
            .unwrap_or_else(|| SYNC_REMOVAL_REASON.to_owned());
        for assignable in held.difference(&desired_set).copied() {
            match self
                .revoke(
                    employee_id,
                    assignable,
                    Some(removal_reason.clone()),
                    options.assigned_by,
                )
                .await
            {
                Ok(Some(_)) => outcome.removed.push(assignable),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        employee_id = %employee_id,
                        assignable = %assignable,
                        error = %error,
                        "sync failed to unassign"
                    );
                    outcome.failed.push(failure(assignable, &error));
                }
            }
        }

        for assignable in desired {
            if held.contains(&assignable) {
                outcome.unchanged.push(assignable);
                continue;
            }
            match self
                .grant(&employee, options.grant(employee_id, assignable))
                .await
            {
                Ok(_) => outcome.added.push(assignable),
                Err(error) => {
                    warn!(
                        employee_id = %employee_id,
                        assignable = %assignable,
                        error = %error,
                        "sync failed to assign"
                    );
                    outcome.failed.push(failure(assignable, &error));
                }
            }
        }

        Ok(outcome)
    }

    /// Runs [`Self::sync_with_detach`] for groups, roles and permissions at once.
    pub async fn sync_assignments(
        &self,
        employee_id: EmployeeId,
        request: &AssignmentRequest,
        options: &GrantOptions,
    ) -> AppResult<SyncOutcome> {
        let mut outcome = SyncOutcome::default();

        for assignable_type in AssignableType::all().iter().copied() {
            let partial = self
                .sync_with_detach(
                    employee_id,
                    assignable_type,
                    &request.ids_for(assignable_type),
                    options,
                )
                .await?;
            outcome.added.extend(partial.added);
            outcome.removed.extend(partial.removed);
            outcome.unchanged.extend(partial.unchanged);
            outcome.failed.extend(partial.failed);
        }

        Ok(outcome)
    }

    async fn held_of_type(
        &self,
        employee_id: EmployeeId,
        assignable_type: AssignableType,
    ) -> AppResult<BTreeSet<AssignableRef>> {
        Ok(self
            .assignments
            .list_employee_assignments(employee_id, true)
            .await?
            .into_iter()
            .map(|assignment| assignment.assignable)
            .filter(|assignable| assignable.assignable_type() == assignable_type)
            .collect())
    }
}

fn unique_refs(assignable_type: AssignableType, ids: &[i64]) -> Vec<AssignableRef> {
    let mut seen = BTreeSet::new();
    ids.iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .map(|id| AssignableRef::from_parts(assignable_type, id))
        .collect()
}
