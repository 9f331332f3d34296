//! Shared primitives for all Rust crates in the directory RBAC workspace.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;
mod ids;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::DirectoryIdentity;
pub use ids::{AssignmentId, EmployeeId, GroupId, PermissionId, RoleId};

/// Result type used across workspace crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An active, unexpired assignment already exists for the pair.
    #[error("duplicate active assignment: {0}")]
    DuplicateActiveAssignment(String),

    /// The entity kind cannot be assigned to an employee.
    #[error("invalid assignable type '{0}'")]
    InvalidAssignableType(String),

    /// A group hierarchy change would introduce a cycle.
    #[error("circular reference: {0}")]
    CircularReference(String),

    /// Deletion is blocked by dependent rows.
    #[error("has dependents: {0}")]
    HasDependents(String),

    /// A permission with the same `(module, action)` pair already exists.
    #[error("duplicate permission '{module}.{action}'")]
    DuplicatePermission {
        /// Permission module.
        module: String,
        /// Permission action.
        action: String,
    },

    /// User is not authenticated or not allowed to access a resource.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
