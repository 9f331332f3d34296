use std::collections::HashMap;
use std::time::{Duration, Instant};

use adrbac_application::PermissionCache;
use adrbac_core::{AppResult, EmployeeId};
use adrbac_domain::EffectivePermissionSet;
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct PermissionCacheEntry {
    permissions: EffectivePermissionSet,
    expires_at: Instant,
}

/// In-process permission cache for single-node deployments and tests.
#[derive(Default)]
pub struct InMemoryPermissionCache {
    entries: RwLock<HashMap<EmployeeId, PermissionCacheEntry>>,
}

impl InMemoryPermissionCache {
    /// Creates an empty in-memory permission cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionCache for InMemoryPermissionCache {
    async fn get(&self, employee_id: EmployeeId) -> AppResult<Option<EffectivePermissionSet>> {
        {
            let entries = self.entries.read().await;
            match entries.get(&employee_id) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.permissions.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(&employee_id)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(&employee_id);
        }

        Ok(None)
    }

    async fn put(
        &self,
        employee_id: EmployeeId,
        permissions: &EffectivePermissionSet,
        ttl_seconds: u32,
    ) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
            .unwrap_or(now);

        self.entries.write().await.insert(
            employee_id,
            PermissionCacheEntry {
                permissions: permissions.clone(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn invalidate(&self, employee_id: EmployeeId) -> AppResult<()> {
        self.entries.write().await.remove(&employee_id);
        Ok(())
    }
}
