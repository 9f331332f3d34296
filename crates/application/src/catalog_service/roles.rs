use super::*;

use crate::{CatalogEntryChanges, NewRole, RolePermissionChange};

impl CatalogService {
    /// Lists non-deleted roles.
    pub async fn list_roles(&self) -> AppResult<Vec<Role>> {
        self.catalog.list_roles().await
    }

    /// Creates a role, optionally owned by an existing group.
    pub async fn create_role(&self, actor: Option<EmployeeId>, input: NewRole) -> AppResult<Role> {
        require_name(&input.name)?;
        if input.slug.trim().is_empty() {
            return Err(AppError::Validation("role slug must not be empty".to_owned()));
        }
        if let Some(group_id) = input.group_id {
            self.load_group(group_id).await?;
        }

        let role = self.catalog.create_role(input).await?;
        self.record_audit(audit_event(
            actor,
            AuditAction::RoleCreated,
            "rbac_role",
            role.id,
            format!("created role '{}'", role.slug),
        ))
        .await;

        Ok(role)
    }

    /// Renames or re-describes a role.
    pub async fn update_role(
        &self,
        actor: Option<EmployeeId>,
        role_id: RoleId,
        changes: CatalogEntryChanges,
    ) -> AppResult<Role> {
        require_name(&changes.name)?;
        let role = self.load_role(role_id).await?;
        require_mutable("role", &role.slug, role.is_system)?;

        let role = self.catalog.update_role(role_id, changes).await?;
        self.record_audit(audit_event(
            actor,
            AuditAction::RoleUpdated,
            "rbac_role",
            role.id,
            format!("updated role '{}'", role.slug),
        ))
        .await;

        Ok(role)
    }

    /// Soft-deletes a role no employee currently holds.
    pub async fn delete_role(&self, actor: Option<EmployeeId>, role_id: RoleId) -> AppResult<()> {
        let role = self.load_role(role_id).await?;
        require_mutable("role", &role.slug, role.is_system)?;

        let holders = self
            .assignments
            .list_holders(AssignableRef::Role(role_id))
            .await?;
        if !holders.is_empty() {
            return Err(AppError::HasDependents(format!(
                "role '{}' is held by {} employees",
                role.slug,
                holders.len()
            )));
        }

        let affected: Vec<AssignableRef> =
            role.group_id.map(AssignableRef::Group).into_iter().collect();
        let group_holders = self.holders_of(&affected).await?;

        self.catalog.soft_delete_role(role_id).await?;
        self.fan_out(group_holders, &affected).await;
        self.record_audit(audit_event(
            actor,
            AuditAction::RoleDeleted,
            "rbac_role",
            role_id,
            format!("deleted role '{}'", role.slug),
        ))
        .await;

        Ok(())
    }

    /// Attaches permissions to a role. Returns the ids newly attached.
    pub async fn attach_permissions(
        &self,
        actor: Option<EmployeeId>,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<PermissionId>> {
        let role = self.load_mutable_role(role_id).await?;
        for permission_id in permission_ids {
            self.load_permission(*permission_id).await?;
        }
        let (affected, holders) = self.role_holders(&role).await?;

        let attached = self
            .catalog
            .attach_role_permissions(role_id, permission_ids)
            .await?;
        self.after_permission_change(
            actor,
            &role,
            &RolePermissionChange {
                attached: attached.clone(),
                detached: Vec::new(),
            },
            holders,
            &affected,
        )
        .await;

        Ok(attached)
    }

    /// Detaches permissions from a role. Returns the ids detached.
    pub async fn detach_permissions(
        &self,
        actor: Option<EmployeeId>,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<PermissionId>> {
        let role = self.load_mutable_role(role_id).await?;
        let (affected, holders) = self.role_holders(&role).await?;

        let detached = self
            .catalog
            .detach_role_permissions(role_id, permission_ids)
            .await?;
        self.after_permission_change(
            actor,
            &role,
            &RolePermissionChange {
                attached: Vec::new(),
                detached: detached.clone(),
            },
            holders,
            &affected,
        )
        .await;

        Ok(detached)
    }

    /// Makes the permissions attached to a role equal `permission_ids`.
    ///
    /// Holders are invalidated even when the attach step fails after the
    /// detach step was written.
    pub async fn sync_permissions(
        &self,
        actor: Option<EmployeeId>,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<RolePermissionChange> {
        let role = self.load_mutable_role(role_id).await?;
        let desired: BTreeSet<PermissionId> = permission_ids.iter().copied().collect();
        for permission_id in &desired {
            self.load_permission(*permission_id).await?;
        }
        let current: BTreeSet<PermissionId> = self
            .catalog
            .role_permission_ids(role_id)
            .await?
            .into_iter()
            .collect();

        let to_detach: Vec<PermissionId> = current.difference(&desired).copied().collect();
        let to_attach: Vec<PermissionId> = desired.difference(&current).copied().collect();
        if to_detach.is_empty() && to_attach.is_empty() {
            return Ok(RolePermissionChange::default());
        }
        let (affected, holders) = self.role_holders(&role).await?;

        let mut change = RolePermissionChange::default();
        let written = self
            .rewrite_role_permissions(role_id, &to_detach, &to_attach, &mut change)
            .await;
        self.after_permission_change(actor, &role, &change, holders, &affected)
            .await;
        written?;

        Ok(change)
    }

    /// Moves a role into a group.
    pub async fn set_group(
        &self,
        actor: Option<EmployeeId>,
        role_id: RoleId,
        group_id: GroupId,
    ) -> AppResult<Role> {
        self.load_group(group_id).await?;
        self.move_role(actor, role_id, Some(group_id)).await
    }

    /// Removes a role from its group.
    pub async fn clear_group(&self, actor: Option<EmployeeId>, role_id: RoleId) -> AppResult<Role> {
        self.move_role(actor, role_id, None).await
    }

    async fn move_role(
        &self,
        actor: Option<EmployeeId>,
        role_id: RoleId,
        group_id: Option<GroupId>,
    ) -> AppResult<Role> {
        let role = self.load_mutable_role(role_id).await?;
        if role.group_id == group_id {
            return Ok(role);
        }

        let affected: Vec<AssignableRef> = role
            .group_id
            .into_iter()
            .chain(group_id)
            .map(AssignableRef::Group)
            .collect();
        let holders = self.holders_of(&affected).await?;

        let moved = self.catalog.set_role_group(role_id, group_id).await?;
        self.fan_out(holders, &affected).await;
        self.record_audit(audit_event(
            actor,
            AuditAction::RoleGroupChanged,
            "rbac_role",
            role_id,
            match group_id {
                Some(group_id) => format!("moved role '{}' into group {group_id}", role.slug),
                None => format!("removed role '{}' from its group", role.slug),
            },
        ))
        .await;

        Ok(moved)
    }

    async fn load_mutable_role(&self, role_id: RoleId) -> AppResult<Role> {
        let role = self.load_role(role_id).await?;
        require_mutable("role", &role.slug, role.is_system)?;
        Ok(role)
    }

    async fn role_holders(
        &self,
        role: &Role,
    ) -> AppResult<(Vec<AssignableRef>, BTreeSet<EmployeeId>)> {
        let affected: Vec<AssignableRef> = std::iter::once(AssignableRef::Role(role.id))
            .chain(role.group_id.map(AssignableRef::Group))
            .collect();
        let holders = self.holders_of(&affected).await?;
        Ok((affected, holders))
    }

    // Records each step in `change` as soon as it is written.
    async fn rewrite_role_permissions(
        &self,
        role_id: RoleId,
        to_detach: &[PermissionId],
        to_attach: &[PermissionId],
        change: &mut RolePermissionChange,
    ) -> AppResult<()> {
        change.detached = self
            .catalog
            .detach_role_permissions(role_id, to_detach)
            .await?;
        change.attached = self
            .catalog
            .attach_role_permissions(role_id, to_attach)
            .await?;
        Ok(())
    }

    async fn after_permission_change(
        &self,
        actor: Option<EmployeeId>,
        role: &Role,
        change: &RolePermissionChange,
        holders: BTreeSet<EmployeeId>,
        affected: &[AssignableRef],
    ) {
        if change.attached.is_empty() && change.detached.is_empty() {
            return;
        }

        self.fan_out(holders, affected).await;
        self.record_audit(audit_event(
            actor,
            AuditAction::RolePermissionsChanged,
            "rbac_role",
            role.id,
            format!(
                "role '{}' gained {} permissions and lost {}",
                role.slug,
                change.attached.len(),
                change.detached.len()
            ),
        ))
        .await;
    }
}
