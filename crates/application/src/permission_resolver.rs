use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, warn};

use adrbac_core::{AppResult, EmployeeId};
use adrbac_domain::EffectivePermissionSet;

use crate::{PermissionBreakdown, PermissionCache, PermissionSourceRepository};

mod ledger;

use ledger::InvalidationLedger;

/// Resolver settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionResolverConfig {
    /// Lifetime of a cached permission set. Zero disables caching.
    pub cache_ttl_seconds: u32,
}

impl Default for PermissionResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 3600,
        }
    }
}

/// Answers permission queries from cached or freshly computed permission sets.
///
/// Clones share one invalidation ledger, so a mutation service holding a
/// clone coordinates with readers using another.
#[derive(Clone)]
pub struct PermissionResolver {
    sources: Arc<dyn PermissionSourceRepository>,
    cache: Arc<dyn PermissionCache>,
    config: PermissionResolverConfig,
    ledger: Arc<InvalidationLedger>,
}

impl PermissionResolver {
    /// Creates a resolver over the permission sources and a cache adapter.
    #[must_use]
    pub fn new(
        sources: Arc<dyn PermissionSourceRepository>,
        cache: Arc<dyn PermissionCache>,
        config: PermissionResolverConfig,
    ) -> Self {
        Self {
            sources,
            cache,
            config,
            ledger: Arc::new(InvalidationLedger::default()),
        }
    }

    /// Returns whether the employee currently holds the permission.
    pub async fn has_permission(&self, employee_id: EmployeeId, slug: &str) -> AppResult<bool> {
        if self.bypasses_cache(employee_id).await {
            return self.has_permission_uncached(employee_id, slug).await;
        }

        Ok(self.cached_set(employee_id).await?.contains(slug))
    }

    /// Returns whether the employee holds at least one of the permissions.
    pub async fn any_permission<S: AsRef<str> + Sync>(
        &self,
        employee_id: EmployeeId,
        slugs: &[S],
    ) -> AppResult<bool> {
        if slugs.is_empty() {
            return Ok(false);
        }

        Ok(self
            .effective_permissions(employee_id)
            .await?
            .contains_any(slugs))
    }

    /// Returns whether the employee holds every one of the permissions.
    pub async fn all_permissions<S: AsRef<str> + Sync>(
        &self,
        employee_id: EmployeeId,
        slugs: &[S],
    ) -> AppResult<bool> {
        if slugs.is_empty() {
            return Ok(true);
        }

        Ok(self
            .effective_permissions(employee_id)
            .await?
            .contains_all(slugs))
    }

    /// Returns the employee's effective permission set.
    pub async fn effective_permissions(
        &self,
        employee_id: EmployeeId,
    ) -> AppResult<EffectivePermissionSet> {
        if self.bypasses_cache(employee_id).await {
            return self.compute(employee_id).await;
        }

        self.cached_set(employee_id).await
    }

    /// Returns the employee's permissions split by granting path. Never cached.
    pub async fn permission_breakdown(
        &self,
        employee_id: EmployeeId,
    ) -> AppResult<PermissionBreakdown> {
        self.sources.permission_breakdown(employee_id).await
    }

    /// Drops the cached set of one employee.
    ///
    /// Must be called after the mutation that changed the employee's
    /// permissions has committed. A failed cache delete is logged and the
    /// employee bypasses the cache until a later delete succeeds.
    pub async fn invalidate(&self, employee_id: EmployeeId) {
        self.ledger.advance();

        match self.cache.invalidate(employee_id).await {
            Ok(()) => {
                self.ledger.clear_bypass(employee_id);
                debug!(employee_id = %employee_id, "permission cache invalidated");
            }
            Err(error) => {
                self.ledger.mark_bypass(employee_id);
                error!(
                    employee_id = %employee_id,
                    error = %error,
                    "failed to invalidate permission cache; bypassing cache for employee"
                );
            }
        }
    }

    /// Drops the cached sets of several employees. Duplicates are collapsed.
    pub async fn invalidate_many(&self, employee_ids: impl IntoIterator<Item = EmployeeId>) {
        let unique: BTreeSet<EmployeeId> = employee_ids.into_iter().collect();
        for employee_id in unique {
            self.invalidate(employee_id).await;
        }
    }

    async fn cached_set(&self, employee_id: EmployeeId) -> AppResult<EffectivePermissionSet> {
        match self.cache.get(employee_id).await {
            Ok(Some(permissions)) => return Ok(permissions),
            Ok(None) => {}
            Err(error) => {
                warn!(
                    employee_id = %employee_id,
                    error = %error,
                    "permission cache read failed; recomputing"
                );
                return self.compute(employee_id).await;
            }
        }

        let epoch = self.ledger.epoch();
        let permissions = self.compute(employee_id).await?;
        self.store(employee_id, &permissions, epoch).await;
        Ok(permissions)
    }

    // A set computed before an invalidation must not outlive it: skip the
    // write when the epoch already moved, and undo it when the epoch moved
    // while writing.
    async fn store(&self, employee_id: EmployeeId, permissions: &EffectivePermissionSet, epoch: u64) {
        if self.config.cache_ttl_seconds == 0 || self.ledger.epoch() != epoch {
            return;
        }

        if let Err(error) = self
            .cache
            .put(employee_id, permissions, self.config.cache_ttl_seconds)
            .await
        {
            warn!(
                employee_id = %employee_id,
                error = %error,
                "failed to store permission set in cache"
            );
            return;
        }

        if self.ledger.epoch() != epoch {
            self.invalidate(employee_id).await;
        }
    }

    async fn compute(&self, employee_id: EmployeeId) -> AppResult<EffectivePermissionSet> {
        Ok(self
            .sources
            .permission_breakdown(employee_id)
            .await?
            .effective_set())
    }

    async fn has_permission_uncached(&self, employee_id: EmployeeId, slug: &str) -> AppResult<bool> {
        if self.sources.has_direct_permission(employee_id, slug).await? {
            return Ok(true);
        }
        if self.sources.has_role_permission(employee_id, slug).await? {
            return Ok(true);
        }
        self.sources
            .has_group_role_permission(employee_id, slug)
            .await
    }

    // Retries the pending delete; success returns the employee to cached reads.
    async fn bypasses_cache(&self, employee_id: EmployeeId) -> bool {
        if !self.ledger.is_bypassed(employee_id) {
            return false;
        }

        match self.cache.invalidate(employee_id).await {
            Ok(()) => {
                self.ledger.clear_bypass(employee_id);
                debug!(employee_id = %employee_id, "pending permission cache invalidation recovered");
                false
            }
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests;
