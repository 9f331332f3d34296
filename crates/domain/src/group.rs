use std::collections::{HashMap, HashSet};

use adrbac_core::GroupId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named node of the group forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Stable row id.
    pub id: GroupId,
    /// Display name.
    pub name: String,
    /// Unique slug.
    pub slug: String,
    /// Optional description.
    pub description: Option<String>,
    /// Parent group, `None` for roots.
    pub parent_id: Option<GroupId>,
    /// System groups cannot be modified or deleted through catalog operations.
    pub is_system: bool,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Group {
    /// Returns whether the group has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Parent links of the group forest, used to validate hierarchy changes.
#[derive(Debug, Clone, Default)]
pub struct GroupTree {
    parents: HashMap<GroupId, Option<GroupId>>,
}

impl GroupTree {
    /// Builds the tree from `(group, parent)` links.
    #[must_use]
    pub fn from_links(links: impl IntoIterator<Item = (GroupId, Option<GroupId>)>) -> Self {
        Self {
            parents: links.into_iter().collect(),
        }
    }

    /// Returns the ancestor chain of a group, nearest first.
    ///
    /// Stops at the first repeated node so a corrupted hierarchy cannot loop.
    #[must_use]
    pub fn ancestors(&self, group_id: GroupId) -> Vec<GroupId> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([group_id]);
        let mut current = self.parents.get(&group_id).copied().flatten();

        while let Some(parent) = current {
            if !visited.insert(parent) {
                break;
            }
            chain.push(parent);
            current = self.parents.get(&parent).copied().flatten();
        }

        chain
    }

    /// Returns whether making `proposed_parent` the parent of `group_id`
    /// would close a cycle.
    #[must_use]
    pub fn would_create_cycle(&self, group_id: GroupId, proposed_parent: GroupId) -> bool {
        if group_id == proposed_parent {
            return true;
        }

        let mut visited = HashSet::new();
        let mut current = Some(proposed_parent);
        while let Some(node) = current {
            if node == group_id || !visited.insert(node) {
                return true;
            }
            current = self.parents.get(&node).copied().flatten();
        }

        false
    }
}
