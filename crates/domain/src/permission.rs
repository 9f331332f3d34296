//! Permission catalog types.
//!
//! A permission is identified by its `(module, action)` pair. The slug is
//! derived from that pair and is therefore unique whenever the pair is.

use std::collections::BTreeSet;

use adrbac_core::{AppError, AppResult, NonEmptyString, PermissionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actions generated for every manageable module.
pub const STANDARD_ACTIONS: &[&str] = &["create", "read", "update", "delete"];

/// Domain actions detected from column names of a manageable module.
pub const SPECIAL_ACTIONS: &[&str] = &["approve", "assign", "review", "audit", "process", "verify"];

/// Identity key of a permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    module: NonEmptyString,
    action: NonEmptyString,
}

impl PermissionKey {
    /// Creates a validated key. The action is normalized to lowercase.
    pub fn new(module: impl Into<String>, action: impl Into<String>) -> AppResult<Self> {
        let module = NonEmptyString::new(module.into().trim())?;
        let action = action.into().trim().to_lowercase();
        if action.contains(char::is_whitespace) || action.contains('.') {
            return Err(AppError::Validation(format!(
                "permission action '{action}' must not contain whitespace or '.'"
            )));
        }

        Ok(Self {
            module,
            action: NonEmptyString::new(action)?,
        })
    }

    /// Returns the module name.
    #[must_use]
    pub fn module(&self) -> &str {
        self.module.as_str()
    }

    /// Returns the action name.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.as_str()
    }

    /// Returns the derived slug, `snake_case(module).action`.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}.{}", snake_case(self.module()), self.action())
    }

    /// Returns the derived display name, e.g. `Approve Leave Request`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut action = self.action().chars();
        let action = match action.next() {
            Some(first) => first.to_uppercase().chain(action).collect::<String>(),
            None => String::new(),
        };

        let module_words = snake_case(self.module())
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        format!("{action} {module_words}")
    }
}

/// Named unit of access control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Stable row id.
    pub id: PermissionId,
    /// Human-readable name.
    pub name: String,
    /// Identity key.
    pub key: PermissionKey,
    /// Optional description.
    pub description: Option<String>,
    /// System permissions cannot be deleted through catalog operations.
    pub is_system: bool,
    /// Soft-deletion timestamp.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Permission {
    /// Returns the permission slug.
    #[must_use]
    pub fn slug(&self) -> String {
        self.key.slug()
    }

    /// Returns whether the permission has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Returns the actions a module exposes given its writable column names.
///
/// Standard CRUD actions always come first; a special action is added once
/// when any column name contains its keyword.
#[must_use]
pub fn derive_module_actions<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    let mut actions: Vec<String> = STANDARD_ACTIONS
        .iter()
        .map(|action| (*action).to_owned())
        .collect();
    let mut special = BTreeSet::new();

    for column in columns {
        let column = column.as_ref().to_lowercase();
        if let Some(action) = SPECIAL_ACTIONS
            .iter()
            .find(|action| column.contains(**action))
        {
            special.insert(*action);
        }
    }

    actions.extend(
        SPECIAL_ACTIONS
            .iter()
            .filter(|action| special.contains(**action))
            .map(|action| (*action).to_owned()),
    );
    actions
}

/// Converts `PascalCase`, `camelCase` or spaced names to `snake_case`.
#[must_use]
pub fn snake_case(value: &str) -> String {
    let chars: Vec<char> = value.trim().chars().collect();
    let mut output = String::with_capacity(chars.len() + 4);

    for (index, current) in chars.iter().enumerate() {
        if current.is_whitespace() || *current == '-' {
            if !output.ends_with('_') && !output.is_empty() {
                output.push('_');
            }
            continue;
        }

        if current.is_uppercase() {
            let previous = index.checked_sub(1).and_then(|prev| chars.get(prev));
            let next = chars.get(index + 1);
            let boundary = match previous {
                Some(previous) if previous.is_lowercase() || previous.is_ascii_digit() => true,
                Some(previous) if previous.is_uppercase() => {
                    next.is_some_and(|next| next.is_lowercase())
                }
                _ => false,
            };
            if boundary && !output.ends_with('_') {
                output.push('_');
            }
            output.extend(current.to_lowercase());
        } else {
            output.push(*current);
        }
    }

    output
}
