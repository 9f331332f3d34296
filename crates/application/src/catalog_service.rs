use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use adrbac_core::{AppError, AppResult, EmployeeId, GroupId, PermissionId, RoleId};
use adrbac_domain::{AssignableRef, AuditAction, Group, Permission, Role};

use crate::{AssignmentRepository, AuditEvent, AuditSink, CatalogRepository, PermissionResolver};

mod groups;
mod permissions;
mod roles;

/// Application service for the group, role and permission catalog.
///
/// Mutations that change what a role or group grants invalidate the cached
/// permission sets of every current holder.
#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    resolver: PermissionResolver,
    audit_sink: Arc<dyn AuditSink>,
}

impl CatalogService {
    /// Creates a catalog service.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        resolver: PermissionResolver,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            catalog,
            assignments,
            resolver,
            audit_sink,
        }
    }

    async fn load_group(&self, group_id: GroupId) -> AppResult<Group> {
        self.catalog
            .find_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {group_id} not found")))
    }

    async fn load_role(&self, role_id: RoleId) -> AppResult<Role> {
        self.catalog
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role {role_id} not found")))
    }

    async fn load_permission(&self, permission_id: PermissionId) -> AppResult<Permission> {
        self.catalog
            .find_permission(permission_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("permission {permission_id} not found")))
    }

    /// Lists every employee currently holding one of the entities.
    ///
    /// Called before a catalog write so a failed lookup leaves the catalog
    /// untouched.
    async fn holders_of(&self, entities: &[AssignableRef]) -> AppResult<BTreeSet<EmployeeId>> {
        let mut holders = BTreeSet::new();
        for assignable in entities {
            holders.extend(self.assignments.list_holders(*assignable).await?);
        }
        Ok(holders)
    }

    /// Invalidates `known` holders plus anyone who picked up one of the
    /// entities after they were listed.
    ///
    /// Runs on every exit path once a catalog write has committed. A failed
    /// re-listing still invalidates the holders listed before the write.
    async fn fan_out(&self, known: BTreeSet<EmployeeId>, entities: &[AssignableRef]) {
        let mut affected = known;
        match self.holders_of(entities).await {
            Ok(current) => affected.extend(current),
            Err(error) => warn!(
                error = %error,
                "failed to re-list holders after catalog change; invalidating earlier holders"
            ),
        }

        debug!(count = affected.len(), "fanning out permission cache invalidation");
        self.resolver.invalidate_many(affected).await;
    }

    async fn record_audit(&self, event: AuditEvent) {
        let action = event.action;
        if let Err(error) = self.audit_sink.record(event).await {
            warn!(action = action.as_str(), error = %error, "failed to record audit event");
        }
    }
}

fn require_mutable(kind: &str, slug: &str, is_system: bool) -> AppResult<()> {
    if is_system {
        return Err(AppError::Forbidden(format!(
            "{kind} '{slug}' is system-managed"
        )));
    }
    Ok(())
}

fn require_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_owned()));
    }
    Ok(())
}

fn audit_event(
    actor: Option<EmployeeId>,
    action: AuditAction,
    resource_type: &str,
    resource_id: impl ToString,
    detail: String,
) -> AuditEvent {
    AuditEvent {
        actor,
        action,
        resource_type: resource_type.to_owned(),
        resource_id: resource_id.to_string(),
        detail: Some(detail),
    }
}
