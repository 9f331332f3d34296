use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use adrbac_core::{AppResult, AssignmentId, EmployeeId, GroupId, PermissionId, RoleId};
use adrbac_domain::{AssignableRef, AssignableType, Assignment, AssignmentHistoryEntry};

/// Input payload for one grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    /// Holder.
    pub employee_id: EmployeeId,
    /// Granted entity.
    pub assignable: AssignableRef,
    /// Optional reason.
    pub reason: Option<String>,
    /// Granting employee.
    pub assigned_by: Option<EmployeeId>,
    /// Optional expiry; must lie in the future.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Shared grant attributes applied by sync and batch operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantOptions {
    /// Optional reason.
    pub reason: Option<String>,
    /// Granting employee.
    pub assigned_by: Option<EmployeeId>,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl GrantOptions {
    pub(crate) fn grant(&self, employee_id: EmployeeId, assignable: AssignableRef) -> NewAssignment {
        NewAssignment {
            employee_id,
            assignable,
            reason: self.reason.clone(),
            assigned_by: self.assigned_by,
            expires_at: self.expires_at,
        }
    }
}

/// Entities to grant or revoke, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    /// Groups.
    #[serde(default)]
    pub groups: Vec<GroupId>,
    /// Roles.
    #[serde(default)]
    pub roles: Vec<RoleId>,
    /// Permissions.
    #[serde(default)]
    pub permissions: Vec<PermissionId>,
}

impl AssignmentRequest {
    /// Flattens the request into references, groups first.
    #[must_use]
    pub fn refs(&self) -> Vec<AssignableRef> {
        self.groups
            .iter()
            .copied()
            .map(AssignableRef::Group)
            .chain(self.roles.iter().copied().map(AssignableRef::Role))
            .chain(self.permissions.iter().copied().map(AssignableRef::Permission))
            .collect()
    }

    /// Returns the raw ids requested for one kind.
    #[must_use]
    pub fn ids_for(&self, assignable_type: AssignableType) -> Vec<i64> {
        match assignable_type {
            AssignableType::Group => self.groups.iter().map(GroupId::as_i64).collect(),
            AssignableType::Role => self.roles.iter().map(RoleId::as_i64).collect(),
            AssignableType::Permission => {
                self.permissions.iter().map(PermissionId::as_i64).collect()
            }
        }
    }
}

/// A per-item failure collected by a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Item the failure belongs to.
    pub assignable: AssignableRef,
    /// Rendered error.
    pub error: String,
}

/// Result of granting several entities to one employee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignManyOutcome {
    /// Assignments created.
    pub success: Vec<Assignment>,
    /// Items that failed.
    pub failed: Vec<ItemFailure>,
    /// Items already held.
    pub skipped: Vec<AssignableRef>,
}

/// Result of revoking several entities from one employee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnassignManyOutcome {
    /// Assignments deactivated.
    pub success: Vec<Assignment>,
    /// Items that failed or were not held.
    pub failed: Vec<ItemFailure>,
}

/// Result of a sync that only adds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttachOutcome {
    /// Entities newly granted.
    pub added: Vec<AssignableRef>,
    /// Entities that could not be granted.
    pub failed: Vec<ItemFailure>,
}

/// Result of a sync that adds and removes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Entities newly granted.
    pub added: Vec<AssignableRef>,
    /// Entities revoked.
    pub removed: Vec<AssignableRef>,
    /// Entities held before and after.
    pub unchanged: Vec<AssignableRef>,
    /// Entities whose grant or revocation failed.
    pub failed: Vec<ItemFailure>,
}

/// Result of granting the same entities to several employees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkAssignOutcome {
    /// Per-employee results for employees that could be processed.
    pub success: BTreeMap<EmployeeId, AssignManyOutcome>,
    /// Per-employee errors for employees that could not be processed.
    pub errors: BTreeMap<EmployeeId, String>,
}

/// Aggregate assignment counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentCounts {
    /// All rows.
    pub total: u64,
    /// Active and unexpired rows.
    pub active: u64,
    /// Rows still flagged active but past expiry.
    pub expired: u64,
    /// Deactivated rows.
    pub inactive: u64,
    /// All rows per assignable kind.
    pub by_type: BTreeMap<AssignableType, u64>,
}

/// Repository port for assignments and their history.
///
/// "Current" means `is_active` and either no expiry or an expiry after the
/// storage clock. Every mutating method writes its history entry in the same
/// transaction as the row change.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Creates an assignment with a `created` history entry.
    ///
    /// Any stale expired row for the pair is deactivated first. Fails with
    /// `DuplicateActiveAssignment` when a current row remains.
    async fn create_assignment(&self, input: NewAssignment) -> AppResult<Assignment>;

    /// Finds the current assignment for a pair.
    async fn find_active_assignment(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
    ) -> AppResult<Option<Assignment>>;

    /// Deactivates a stale expired row for a pair, if one exists.
    async fn deactivate_expired_assignment(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
    ) -> AppResult<Option<Assignment>>;

    /// Deactivates the current assignment for a pair with a `deactivated`
    /// history entry. Returns `None` when nothing was current.
    async fn deactivate_assignment(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
        reason: Option<String>,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Option<Assignment>>;

    /// Moves the expiry of a current assignment to `now + days` with an
    /// `extended` history entry.
    async fn extend_assignment(
        &self,
        assignment_id: AssignmentId,
        days: u32,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Assignment>;

    /// Finds one assignment regardless of status.
    async fn find_assignment(&self, assignment_id: AssignmentId) -> AppResult<Option<Assignment>>;

    /// Lists assignments of one employee, optionally only current ones.
    async fn list_employee_assignments(
        &self,
        employee_id: EmployeeId,
        current_only: bool,
    ) -> AppResult<Vec<Assignment>>;

    /// Deactivates every active row whose expiry is at or before `now`.
    async fn deactivate_due_assignments(&self, now: DateTime<Utc>) -> AppResult<Vec<Assignment>>;

    /// Lists history entries of one assignment, oldest first.
    async fn list_history(
        &self,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<AssignmentHistoryEntry>>;

    /// Lists employees currently holding an entity.
    async fn list_holders(&self, assignable: AssignableRef) -> AppResult<Vec<EmployeeId>>;

    /// Counts rows by status and kind.
    async fn assignment_counts(&self) -> AppResult<AssignmentCounts>;

    /// Lists current assignments expiring within `days_ahead` days, soonest first.
    async fn list_expiring(&self, days_ahead: u32) -> AppResult<Vec<Assignment>>;
}
