//! Employee records mirrored from the directory and the HR source.

use adrbac_core::{AppError, AppResult, EmployeeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Employee known to the access-control layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    /// Stable row id.
    pub id: EmployeeId,
    /// Directory account name.
    pub username: String,
    /// HR employee number.
    pub employee_number: Option<String>,
    /// Work email.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Department label from the HR source.
    pub department: Option<String>,
    /// Position label from the HR source.
    pub position: Option<String>,
    /// Inactive employees cannot log in or receive new grants.
    pub is_active: bool,
    /// Last successful login.
    pub last_login_at: Option<DateTime<Utc>>,
    /// Last refresh from the HR source.
    pub synced_at: Option<DateTime<Utc>>,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Employee {
    /// Returns `first_name last_name`, trimmed.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }

    /// Returns whether the employee may log in and receive grants.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.is_active && self.deleted_at.is_none()
    }
}

/// Employee attributes as reported by the external HR source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    /// Directory account name.
    pub username: String,
    /// HR employee number.
    pub employee_number: Option<String>,
    /// Work email.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Department label.
    pub department: Option<String>,
    /// Position label.
    pub position: Option<String>,
    /// Whether HR still lists the employee as active.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl EmployeeRecord {
    /// Checks the fields an upsert relies on.
    pub fn validate(&self) -> AppResult<()> {
        if self.username.trim().is_empty() {
            return Err(AppError::Validation(
                "employee record username must not be empty".to_owned(),
            ));
        }

        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(AppError::Validation(format!(
                "employee record '{}' has invalid email '{email}'",
                self.username
            ))),
        }
    }
}
