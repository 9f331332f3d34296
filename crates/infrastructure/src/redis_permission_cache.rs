//! Redis-backed effective permission cache.

use adrbac_application::PermissionCache;
use adrbac_core::{AppError, AppResult, EmployeeId};
use adrbac_domain::EffectivePermissionSet;
use async_trait::async_trait;
use redis::AsyncCommands;

/// Redis implementation of the permission cache port.
///
/// Each employee's set is one JSON array under `{prefix}:{employee_id}`.
#[derive(Clone)]
pub struct RedisPermissionCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisPermissionCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, employee_id: EmployeeId) -> String {
        format!("{}:{employee_id}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl PermissionCache for RedisPermissionCache {
    async fn get(&self, employee_id: EmployeeId) -> AppResult<Option<EffectivePermissionSet>> {
        let key = self.key_for(employee_id);
        let mut connection = self.connection().await?;

        let encoded: Option<String> = connection.get(key).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to read permission cache entry for employee {employee_id}: {error}"
            ))
        })?;

        encoded
            .as_deref()
            .map(|value| {
                serde_json::from_str(value).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid permission cache entry for employee {employee_id}: {error}"
                    ))
                })
            })
            .transpose()
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

        let key = self.key_for(employee_id);
        let value = serde_json::to_string(permissions).map_err(|error| {
            AppError::Internal(format!("failed to encode permission cache entry: {error}"))
        })?;
        let mut connection = self.connection().await?;

        connection
            .set_ex(key, value, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to write permission cache entry for employee {employee_id}: {error}"
                ))
            })
    }

    async fn invalidate(&self, employee_id: EmployeeId) -> AppResult<()> {
        let key = self.key_for(employee_id);
        let mut connection = self.connection().await?;

        let _: u64 = connection.del(key).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to delete permission cache entry for employee {employee_id}: {error}"
            ))
        })?;
        Ok(())
    }
}
