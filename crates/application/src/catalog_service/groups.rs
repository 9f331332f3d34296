use super::*;

use adrbac_domain::GroupTree;

use crate::{CatalogEntryChanges, GroupRoleChange, NewGroup};

impl CatalogService {
    /// Lists non-deleted groups.
    pub async fn list_groups(&self) -> AppResult<Vec<Group>> {
        self.catalog.list_groups().await
    }

    /// Creates a group, optionally under an existing parent.
    pub async fn create_group(&self, actor: Option<EmployeeId>, input: NewGroup) -> AppResult<Group> {
        require_name(&input.name)?;
        if input.slug.trim().is_empty() {
            return Err(AppError::Validation("group slug must not be empty".to_owned()));
        }
        if let Some(parent_id) = input.parent_id {
            self.load_group(parent_id).await?;
        }

        let group = self.catalog.create_group(input).await?;
        self.record_audit(audit_event(
            actor,
            AuditAction::GroupCreated,
            "rbac_group",
            group.id,
            format!("created group '{}'", group.slug),
        ))
        .await;

        Ok(group)
    }

    /// Renames or re-describes a group.
    pub async fn update_group(
        &self,
        actor: Option<EmployeeId>,
        group_id: GroupId,
        changes: CatalogEntryChanges,
    ) -> AppResult<Group> {
        require_name(&changes.name)?;
        let group = self.load_group(group_id).await?;
        require_mutable("group", &group.slug, group.is_system)?;

        let group = self.catalog.update_group(group_id, changes).await?;
        self.record_audit(audit_event(
            actor,
            AuditAction::GroupUpdated,
            "rbac_group",
            group.id,
            format!("updated group '{}'", group.slug),
        ))
        .await;

        Ok(group)
    }

    /// Moves a group under `parent_id`, or to the root with `None`.
    ///
    /// Fails with `CircularReference` when the new parent is the group itself
    /// or one of its descendants.
    pub async fn set_group_parent(
        &self,
        actor: Option<EmployeeId>,
        group_id: GroupId,
        parent_id: Option<GroupId>,
    ) -> AppResult<Group> {
        let group = self.load_group(group_id).await?;
        require_mutable("group", &group.slug, group.is_system)?;

        if let Some(parent_id) = parent_id {
            self.load_group(parent_id).await?;
            let tree = GroupTree::from_links(self.catalog.group_links().await?);
            if tree.would_create_cycle(group_id, parent_id) {
                return Err(AppError::CircularReference(format!(
                    "group {parent_id} cannot become the parent of its ancestor {group_id}"
                )));
            }
        }

        let group = self.catalog.set_group_parent(group_id, parent_id).await?;
        self.record_audit(audit_event(
            actor,
            AuditAction::GroupUpdated,
            "rbac_group",
            group.id,
            match parent_id {
                Some(parent_id) => format!("moved group '{}' under {parent_id}", group.slug),
                None => format!("moved group '{}' to the root", group.slug),
            },
        ))
        .await;

        Ok(group)
    }

    /// Soft-deletes a group with no child groups and no roles.
    pub async fn delete_group(&self, actor: Option<EmployeeId>, group_id: GroupId) -> AppResult<()> {
        let group = self.load_group(group_id).await?;
        require_mutable("group", &group.slug, group.is_system)?;

        let dependents = self.catalog.count_group_dependents(group_id).await?;
        if dependents.child_groups > 0 || dependents.roles > 0 {
            return Err(AppError::HasDependents(format!(
                "group '{}' has {} child groups and {} roles",
                group.slug, dependents.child_groups, dependents.roles
            )));
        }

        self.catalog.soft_delete_group(group_id).await?;
        self.record_audit(audit_event(
            actor,
            AuditAction::GroupDeleted,
            "rbac_group",
            group_id,
            format!("deleted group '{}'", group.slug),
        ))
        .await;

        Ok(())
    }

    /// Makes the roles owned by a group equal `role_ids`.
    ///
    /// Roles pulled in from another group leave that group. Holders of every
    /// group involved are invalidated, including when a later move fails
    /// after earlier ones were written.
    pub async fn sync_group_roles(
        &self,
        actor: Option<EmployeeId>,
        group_id: GroupId,
        role_ids: &[RoleId],
    ) -> AppResult<GroupRoleChange> {
        let group = self.load_group(group_id).await?;
        require_mutable("group", &group.slug, group.is_system)?;

        let desired: BTreeSet<RoleId> = role_ids.iter().copied().collect();
        let current = self.catalog.list_group_roles(group_id).await?;
        let current_ids: BTreeSet<RoleId> = current.iter().map(|role| role.id).collect();

        let mut outgoing = Vec::new();
        for role in &current {
            if !desired.contains(&role.id) {
                require_mutable("role", &role.slug, role.is_system)?;
                outgoing.push(role.id);
            }
        }
        let mut incoming = Vec::new();
        for role_id in &desired {
            let role = self.load_role(*role_id).await?;
            if !current_ids.contains(&role.id) {
                require_mutable("role", &role.slug, role.is_system)?;
                incoming.push(role);
            }
        }
        if outgoing.is_empty() && incoming.is_empty() {
            return Ok(GroupRoleChange::default());
        }

        let affected_groups: Vec<AssignableRef> = std::iter::once(group_id)
            .chain(incoming.iter().filter_map(|role| role.group_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(AssignableRef::Group)
            .collect();
        let holders = self.holders_of(&affected_groups).await?;

        let mut change = GroupRoleChange::default();
        let written = self
            .move_group_roles(group_id, &outgoing, &incoming, &mut change)
            .await;
        if !change.attached.is_empty() || !change.detached.is_empty() {
            self.fan_out(holders, &affected_groups).await;
        }
        written?;

        self.record_audit(audit_event(
            actor,
            AuditAction::GroupRolesChanged,
            "rbac_group",
            group_id,
            format!(
                "group '{}' gained {} roles and lost {}",
                group.slug,
                change.attached.len(),
                change.detached.len()
            ),
        ))
        .await;

        Ok(change)
    }

    // Records each move in `change` as soon as it is written.
    async fn move_group_roles(
        &self,
        group_id: GroupId,
        outgoing: &[RoleId],
        incoming: &[Role],
        change: &mut GroupRoleChange,
    ) -> AppResult<()> {
        for role_id in outgoing {
            self.catalog.set_role_group(*role_id, None).await?;
            change.detached.push(*role_id);
        }
        for role in incoming {
            self.catalog.set_role_group(role.id, Some(group_id)).await?;
            change.attached.push(role.id);
        }
        Ok(())
    }
}
