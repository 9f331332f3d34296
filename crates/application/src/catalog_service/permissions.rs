use super::*;

use adrbac_domain::{PermissionKey, derive_module_actions};

use crate::NewPermission;

impl CatalogService {
    /// Lists non-deleted permissions.
    pub async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        self.catalog.list_permissions().await
    }

    /// Creates a permission keyed by `(module, action)`.
    pub async fn create_permission(
        &self,
        actor: Option<EmployeeId>,
        input: NewPermission,
    ) -> AppResult<Permission> {
        if self
            .catalog
            .find_permission_by_key(&input.key)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicatePermission {
                module: input.key.module().to_owned(),
                action: input.key.action().to_owned(),
            });
        }

        let permission = self.catalog.create_permission(input).await?;
        self.record_audit(audit_event(
            actor,
            AuditAction::PermissionCreated,
            "rbac_permission",
            permission.id,
            format!("created permission '{}'", permission.slug()),
        ))
        .await;

        Ok(permission)
    }

    /// Creates the standard and column-derived permissions of a module.
    ///
    /// Keys that already exist are left untouched. Returns the permissions
    /// created by this call.
    pub async fn derive_for_module(
        &self,
        actor: Option<EmployeeId>,
        module: &str,
        columns: &[String],
    ) -> AppResult<Vec<Permission>> {
        let mut created = Vec::new();

        for action in derive_module_actions(columns) {
            let key = PermissionKey::new(module, action)?;
            let input = NewPermission {
                key,
                name: None,
                description: None,
                is_system: false,
            };
            match self.create_permission(actor, input).await {
                Ok(permission) => created.push(permission),
                Err(AppError::DuplicatePermission { .. }) => {}
                Err(error) => return Err(error),
            }
        }

        debug!(module, count = created.len(), "derived module permissions");
        Ok(created)
    }

    /// Soft-deletes a permission that is neither attached to a role nor
    /// directly assigned.
    pub async fn delete_permission(
        &self,
        actor: Option<EmployeeId>,
        permission_id: PermissionId,
    ) -> AppResult<()> {
        let permission = self.load_permission(permission_id).await?;
        require_mutable("permission", &permission.slug(), permission.is_system)?;

        let dependents = self
            .catalog
            .count_permission_dependents(permission_id)
            .await?;
        if dependents.roles > 0 || dependents.direct_holders > 0 {
            return Err(AppError::HasDependents(format!(
                "permission '{}' is attached to {} roles and held directly by {} employees",
                permission.slug(),
                dependents.roles,
                dependents.direct_holders
            )));
        }

        self.catalog.soft_delete_permission(permission_id).await?;
        self.record_audit(audit_event(
            actor,
            AuditAction::PermissionDeleted,
            "rbac_permission",
            permission_id,
            format!("deleted permission '{}'", permission.slug()),
        ))
        .await;

        Ok(())
    }
}
