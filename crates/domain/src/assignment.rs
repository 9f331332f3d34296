//! Assignments of groups, roles and permissions to employees.
//!
//! Storage keeps the assignable side as a `(type, id)` pair; everything above
//! the store boundary works with [`AssignableRef`].

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use adrbac_core::{AppError, AssignmentId, EmployeeId, GroupId, PermissionId, RoleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Kind of entity an assignment grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignableType {
    /// A group; grants the permissions of every role in the group.
    Group,
    /// A role; grants the role's permissions.
    Role,
    /// A single permission.
    Permission,
}

impl AssignableType {
    /// Returns the stable storage tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Role => "role",
            Self::Permission => "permission",
        }
    }

    /// Returns all assignable types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        &[Self::Group, Self::Role, Self::Permission]
    }
}

impl FromStr for AssignableType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "group" => Ok(Self::Group),
            "role" => Ok(Self::Role),
            "permission" => Ok(Self::Permission),
            _ => Err(AppError::InvalidAssignableType(value.to_owned())),
        }
    }
}

impl Display for AssignableType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Reference to an assignable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum AssignableRef {
    /// Group reference.
    Group(GroupId),
    /// Role reference.
    Role(RoleId),
    /// Permission reference.
    Permission(PermissionId),
}

impl AssignableRef {
    /// Rebuilds a reference from its storage pair.
    #[must_use]
    pub fn from_parts(assignable_type: AssignableType, id: i64) -> Self {
        match assignable_type {
            AssignableType::Group => Self::Group(GroupId::new(id)),
            AssignableType::Role => Self::Role(RoleId::new(id)),
            AssignableType::Permission => Self::Permission(PermissionId::new(id)),
        }
    }

    /// Parses a `(type tag, id)` pair received from a caller.
    pub fn parse(assignable_type: &str, id: i64) -> Result<Self, AppError> {
        Ok(Self::from_parts(AssignableType::from_str(assignable_type)?, id))
    }

    /// Returns the type tag.
    #[must_use]
    pub fn assignable_type(&self) -> AssignableType {
        match self {
            Self::Group(_) => AssignableType::Group,
            Self::Role(_) => AssignableType::Role,
            Self::Permission(_) => AssignableType::Permission,
        }
    }

    /// Returns the raw row id of the referenced entity.
    #[must_use]
    pub fn raw_id(&self) -> i64 {
        match self {
            Self::Group(id) => id.as_i64(),
            Self::Role(id) => id.as_i64(),
            Self::Permission(id) => id.as_i64(),
        }
    }
}

impl Display for AssignableRef {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.assignable_type(), self.raw_id())
    }
}

/// The fact that an employee holds an assignable entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Stable row id.
    pub id: AssignmentId,
    /// Holder.
    pub employee_id: EmployeeId,
    /// Granted entity.
    pub assignable: AssignableRef,
    /// Free-text reason captured with the latest change.
    pub reason: Option<String>,
    /// Granting employee, when known.
    pub assigned_by: Option<EmployeeId>,
    /// Grant timestamp.
    pub assigned_at: DateTime<Utc>,
    /// Optional expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Cleared on revocation or expiry sweep; rows are never deleted.
    pub is_active: bool,
}

impl Assignment {
    /// Returns whether the expiry has passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Returns whether the assignment grants access at `now`.
    #[must_use]
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    /// Returns whether the row is still flagged active but has expired.
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.is_expired_at(now)
    }

    /// Returns the lifecycle status at `now`.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> AssignmentStatus {
        if !self.is_active {
            AssignmentStatus::Inactive
        } else if self.is_expired_at(now) {
            AssignmentStatus::Expired
        } else {
            AssignmentStatus::Active
        }
    }
}

/// Lifecycle status of an assignment at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Active and unexpired.
    Active,
    /// Flagged active but past its expiry.
    Expired,
    /// Deactivated.
    Inactive,
}

/// Lifecycle transition recorded in assignment history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentHistoryAction {
    /// Assignment created.
    Created,
    /// Assignment deactivated by revocation or expiry.
    Deactivated,
    /// Assignment expiry moved.
    Extended,
}

impl AssignmentHistoryAction {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Deactivated => "deactivated",
            Self::Extended => "extended",
        }
    }
}

impl FromStr for AssignmentHistoryAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created" => Ok(Self::Created),
            "deactivated" => Ok(Self::Deactivated),
            "extended" => Ok(Self::Extended),
            _ => Err(AppError::Validation(format!(
                "unknown assignment history action '{value}'"
            ))),
        }
    }
}

/// Change to append to an assignment's history.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentChange {
    /// Transition.
    pub action: AssignmentHistoryAction,
    /// Structured payload describing the change.
    pub changes: Value,
    /// Acting employee, when known.
    pub changed_by: Option<EmployeeId>,
}

impl AssignmentChange {
    /// Payload for a new grant.
    #[must_use]
    pub fn created(
        reason: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        assigned_by: Option<EmployeeId>,
    ) -> Self {
        Self {
            action: AssignmentHistoryAction::Created,
            changes: json!({
                "reason": reason,
                "expires_at": expires_at,
                "assigned_by": assigned_by,
            }),
            changed_by: assigned_by,
        }
    }

    /// Payload for a revocation or expiry.
    #[must_use]
    pub fn deactivated(reason: Option<&str>, changed_by: Option<EmployeeId>) -> Self {
        Self {
            action: AssignmentHistoryAction::Deactivated,
            changes: json!({ "reason": reason }),
            changed_by,
        }
    }

    /// Payload for an expiry extension.
    #[must_use]
    pub fn extended(
        old_expiry: Option<DateTime<Utc>>,
        new_expiry: DateTime<Utc>,
        extended_days: u32,
        changed_by: Option<EmployeeId>,
    ) -> Self {
        Self {
            action: AssignmentHistoryAction::Extended,
            changes: json!({
                "old_expiry": old_expiry,
                "new_expiry": new_expiry,
                "extended_days": extended_days,
                "changed_by": changed_by,
            }),
            changed_by,
        }
    }
}

/// Reason recorded when the sweep or a new grant retires an expired row.
pub const EXPIRED_REASON: &str = "expired";

/// Immutable history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentHistoryEntry {
    /// Stable row id.
    pub id: i64,
    /// Owning assignment.
    pub assignment_id: AssignmentId,
    /// Transition.
    pub action: AssignmentHistoryAction,
    /// Structured payload describing the change.
    pub changes: Value,
    /// Acting employee, when known.
    pub changed_by: Option<EmployeeId>,
    /// Write timestamp.
    pub recorded_at: DateTime<Utc>,
}

impl AssignmentHistoryEntry {
    /// Returns a one-line summary for administrative views.
    #[must_use]
    pub fn summary(&self) -> String {
        match self.action {
            AssignmentHistoryAction::Created => "Assignment created".to_owned(),
            AssignmentHistoryAction::Deactivated => {
                let reason = self
                    .changes
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("No reason provided");
                format!("Assignment deactivated. Reason: {reason}")
            }
            AssignmentHistoryAction::Extended => {
                let days = self
                    .changes
                    .get("extended_days")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                format!("Assignment extended by {days} days")
            }
        }
    }
}
