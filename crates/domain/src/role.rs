use adrbac_core::{GroupId, RoleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named bundle of permissions, optionally owned by one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Stable row id.
    pub id: RoleId,
    /// Display name.
    pub name: String,
    /// Unique slug.
    pub slug: String,
    /// Optional description.
    pub description: Option<String>,
    /// Owning group.
    pub group_id: Option<GroupId>,
    /// System roles cannot be modified or deleted through catalog operations.
    pub is_system: bool,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Role {
    /// Returns whether the role has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
