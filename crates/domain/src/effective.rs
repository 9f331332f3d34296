use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Deduplicated permission slugs reachable by one employee.
///
/// Slugs are unique per permission, so set membership by slug is membership
/// by permission identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectivePermissionSet {
    slugs: BTreeSet<String>,
}

impl EffectivePermissionSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one slug.
    pub fn insert(&mut self, slug: impl Into<String>) -> bool {
        self.slugs.insert(slug.into())
    }

    /// Returns whether the slug is present.
    #[must_use]
    pub fn contains(&self, slug: &str) -> bool {
        self.slugs.contains(slug)
    }

    /// Returns whether at least one slug is present. Empty input yields `false`.
    #[must_use]
    pub fn contains_any<S: AsRef<str>>(&self, slugs: &[S]) -> bool {
        slugs.iter().any(|slug| self.contains(slug.as_ref()))
    }

    /// Returns whether every slug is present. Empty input yields `true`.
    #[must_use]
    pub fn contains_all<S: AsRef<str>>(&self, slugs: &[S]) -> bool {
        slugs.iter().all(|slug| self.contains(slug.as_ref()))
    }

    /// Returns the number of permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }

    /// Iterates slugs in lexical order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.slugs.iter().map(String::as_str)
    }

    /// Returns the slugs as a sorted vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.slugs.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for EffectivePermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            slugs: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for EffectivePermissionSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.slugs.extend(iter.into_iter().map(Into::into));
    }
}
