use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use adrbac_core::{
    AppError, AppResult, AssignmentId, DirectoryIdentity, EmployeeId, GroupId, PermissionId,
    RoleId,
};
use adrbac_domain::{
    AssignableRef, Assignment, AssignmentChange, AssignmentHistoryEntry,
    EXPIRED_REASON, EffectivePermissionSet, Employee, EmployeeRecord, Group, Permission,
    PermissionKey, Role,
};

use crate::{
    AssignmentCounts, AssignmentRepository, AuditEvent, AuditSink, Authenticator,
    CatalogEntryChanges, CatalogRepository, EmployeeRepository, EmployeeSource, GroupDependents,
    GroupPermissions, NewAssignment, NewGroup, NewPermission, NewRole, PermissionBreakdown,
    PermissionCache, PermissionDependents, PermissionResolver, PermissionResolverConfig,
    PermissionSourceRepository, RolePermissions,
};

#[derive(Default)]
struct StoreState {
    employees: Vec<Employee>,
    groups: Vec<Group>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    role_permissions: BTreeSet<(RoleId, PermissionId)>,
    assignments: Vec<Assignment>,
    history: Vec<AssignmentHistoryEntry>,
    next_id: i64,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        1000 + self.next_id
    }

    fn append_history(&mut self, assignment_id: AssignmentId, change: AssignmentChange) {
        let id = self.next_id();
        self.history.push(AssignmentHistoryEntry {
            id,
            assignment_id,
            action: change.action,
            changes: change.changes,
            changed_by: change.changed_by,
            recorded_at: Utc::now(),
        });
    }

    fn retire_stale(&mut self, employee_id: EmployeeId, assignable: AssignableRef) -> Option<Assignment> {
        let now = Utc::now();
        let index = self.assignments.iter().position(|assignment| {
            assignment.employee_id == employee_id
                && assignment.assignable == assignable
                && assignment.is_stale_at(now)
        })?;
        self.assignments[index].is_active = false;
        let retired = self.assignments[index].clone();
        self.append_history(
            retired.id,
            AssignmentChange::deactivated(Some(EXPIRED_REASON), None),
        );
        Some(retired)
    }

    fn current(&self, employee_id: EmployeeId) -> impl Iterator<Item = &Assignment> {
        let now = Utc::now();
        self.assignments.iter().filter(move |assignment| {
            assignment.employee_id == employee_id && assignment.is_current_at(now)
        })
    }

    fn live_role(&self, role_id: RoleId) -> Option<&Role> {
        self.roles
            .iter()
            .find(|role| role.id == role_id && !role.is_deleted())
    }

    fn live_group(&self, group_id: GroupId) -> Option<&Group> {
        self.groups
            .iter()
            .find(|group| group.id == group_id && !group.is_deleted())
    }

    fn role_permissions(&self, role_id: RoleId) -> Vec<Permission> {
        self.permissions
            .iter()
            .filter(|permission| {
                !permission.is_deleted() && self.role_permissions.contains(&(role_id, permission.id))
            })
            .cloned()
            .collect()
    }

    fn role_entry(&self, role: &Role) -> RolePermissions {
        RolePermissions {
            role: role.clone(),
            permissions: self.role_permissions(role.id),
        }
    }
}

/// In-memory store implementing every repository port over one shared state.
#[derive(Default)]
pub(crate) struct InMemoryRbacStore {
    state: Mutex<StoreState>,
    pub(crate) breakdown_reads: AtomicUsize,
    /// Role id whose group moves fail; zero disables.
    pub(crate) fail_role_moves_for: AtomicI64,
    pub(crate) fail_permission_attach: AtomicBool,
    /// When set, holder lookups fail once `holder_lookups_before_failure`
    /// lookups have succeeded.
    pub(crate) fail_holder_lookups: AtomicBool,
    pub(crate) holder_lookups_before_failure: AtomicUsize,
}

impl InMemoryRbacStore {
    pub(crate) async fn add_employee(&self, id: i64, username: &str, is_active: bool) {
        self.state.lock().await.employees.push(Employee {
            id: EmployeeId::new(id),
            username: username.to_owned(),
            employee_number: None,
            email: format!("{username}@example.com"),
            first_name: username.to_owned(),
            last_name: "Tester".to_owned(),
            department: None,
            position: None,
            is_active,
            last_login_at: None,
            synced_at: None,
            deleted_at: None,
        });
    }

    pub(crate) async fn add_group(&self, id: i64, slug: &str, parent: Option<i64>) {
        self.state.lock().await.groups.push(Group {
            id: GroupId::new(id),
            name: slug.to_owned(),
            slug: slug.to_owned(),
            description: None,
            parent_id: parent.map(GroupId::new),
            is_system: false,
            deleted_at: None,
        });
    }

    pub(crate) async fn add_system_group(&self, id: i64, slug: &str) {
        self.add_group(id, slug, None).await;
        let mut state = self.state.lock().await;
        if let Some(group) = state.groups.iter_mut().find(|group| group.id.as_i64() == id) {
            group.is_system = true;
        }
    }

    pub(crate) async fn add_role(&self, id: i64, slug: &str, group: Option<i64>) {
        self.state.lock().await.roles.push(Role {
            id: RoleId::new(id),
            name: slug.to_owned(),
            slug: slug.to_owned(),
            description: None,
            group_id: group.map(GroupId::new),
            is_system: false,
            deleted_at: None,
        });
    }

    pub(crate) async fn mark_role_system(&self, id: i64) {
        let mut state = self.state.lock().await;
        if let Some(role) = state.roles.iter_mut().find(|role| role.id.as_i64() == id) {
            role.is_system = true;
        }
    }

    pub(crate) async fn role(&self, id: i64) -> Option<Role> {
        self.state
            .lock()
            .await
            .roles
            .iter()
            .find(|role| role.id.as_i64() == id)
            .cloned()
    }

    pub(crate) async fn add_permission(&self, id: i64, module: &str, action: &str) {
        let key = PermissionKey::new(module, action).unwrap_or_else(|_| unreachable!());
        self.state.lock().await.permissions.push(Permission {
            id: PermissionId::new(id),
            name: key.display_name(),
            key,
            description: None,
            is_system: false,
            deleted_at: None,
        });
    }

    pub(crate) async fn link(&self, role: i64, permission: i64) {
        self.state
            .lock()
            .await
            .role_permissions
            .insert((RoleId::new(role), PermissionId::new(permission)));
    }

    /// Inserts a row directly, bypassing the uniqueness check.
    pub(crate) async fn insert_raw(
        &self,
        employee: i64,
        assignable: AssignableRef,
        expires_at: Option<DateTime<Utc>>,
    ) -> AssignmentId {
        let mut state = self.state.lock().await;
        let id = AssignmentId::new(state.next_id());
        state.assignments.push(Assignment {
            id,
            employee_id: EmployeeId::new(employee),
            assignable,
            reason: None,
            assigned_by: None,
            assigned_at: Utc::now() - Duration::days(30),
            expires_at,
            is_active: true,
        });
        id
    }

    pub(crate) async fn rows_for(&self, employee: i64, assignable: AssignableRef) -> Vec<Assignment> {
        self.state
            .lock()
            .await
            .assignments
            .iter()
            .filter(|assignment| {
                assignment.employee_id.as_i64() == employee && assignment.assignable == assignable
            })
            .cloned()
            .collect()
    }

    pub(crate) async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }

    pub(crate) async fn group(&self, id: i64) -> Option<Group> {
        self.state
            .lock()
            .await
            .groups
            .iter()
            .find(|group| group.id.as_i64() == id)
            .cloned()
    }

    pub(crate) async fn employee(&self, id: i64) -> Option<Employee> {
        self.state
            .lock()
            .await
            .employees
            .iter()
            .find(|employee| employee.id.as_i64() == id)
            .cloned()
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryRbacStore {
    async fn create_assignment(&self, input: NewAssignment) -> AppResult<Assignment> {
        let mut state = self.state.lock().await;
        state.retire_stale(input.employee_id, input.assignable);

        if state
            .current(input.employee_id)
            .any(|assignment| assignment.assignable == input.assignable)
        {
            return Err(AppError::DuplicateActiveAssignment(format!(
                "employee {} already holds {}",
                input.employee_id, input.assignable
            )));
        }

        let assignment = Assignment {
            id: AssignmentId::new(state.next_id()),
            employee_id: input.employee_id,
            assignable: input.assignable,
            reason: input.reason.clone(),
            assigned_by: input.assigned_by,
            assigned_at: Utc::now(),
            expires_at: input.expires_at,
            is_active: true,
        };
        state.assignments.push(assignment.clone());
        state.append_history(
            assignment.id,
            AssignmentChange::created(
                input.reason.as_deref(),
                input.expires_at,
                input.assigned_by,
            ),
        );
        Ok(assignment)
    }

    async fn find_active_assignment(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
    ) -> AppResult<Option<Assignment>> {
        Ok(self
            .state
            .lock()
            .await
            .current(employee_id)
            .find(|assignment| assignment.assignable == assignable)
            .cloned())
    }

    async fn deactivate_expired_assignment(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
    ) -> AppResult<Option<Assignment>> {
        Ok(self.state.lock().await.retire_stale(employee_id, assignable))
    }

    async fn deactivate_assignment(
        &self,
        employee_id: EmployeeId,
        assignable: AssignableRef,
        reason: Option<String>,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Option<Assignment>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let Some(index) = state.assignments.iter().position(|assignment| {
            assignment.employee_id == employee_id
                && assignment.assignable == assignable
                && assignment.is_current_at(now)
        }) else {
            return Ok(None);
        };

        let assignment = &mut state.assignments[index];
        assignment.is_active = false;
        if reason.is_some() {
            assignment.reason = reason.clone();
        }
        let assignment = assignment.clone();
        state.append_history(
            assignment.id,
            AssignmentChange::deactivated(reason.as_deref(), changed_by),
        );
        Ok(Some(assignment))
    }

    async fn extend_assignment(
        &self,
        assignment_id: AssignmentId,
        days: u32,
        changed_by: Option<EmployeeId>,
    ) -> AppResult<Assignment> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let assignment = state
            .assignments
            .iter_mut()
            .find(|assignment| assignment.id == assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;
        if !assignment.is_current_at(now) {
            return Err(AppError::Validation(format!(
                "assignment {assignment_id} is not active"
            )));
        }

        let old_expiry = assignment.expires_at;
        let new_expiry = now + Duration::days(i64::from(days));
        assignment.expires_at = Some(new_expiry);
        let assignment = assignment.clone();
        state.append_history(
            assignment_id,
            AssignmentChange::extended(old_expiry, new_expiry, days, changed_by),
        );
        Ok(assignment)
    }

    async fn find_assignment(&self, assignment_id: AssignmentId) -> AppResult<Option<Assignment>> {
        Ok(self
            .state
            .lock()
            .await
            .assignments
            .iter()
            .find(|assignment| assignment.id == assignment_id)
            .cloned())
    }

    async fn list_employee_assignments(
        &self,
        employee_id: EmployeeId,
        current_only: bool,
    ) -> AppResult<Vec<Assignment>> {
        let now = Utc::now();
        Ok(self
            .state
            .lock()
            .await
            .assignments
            .iter()
            .filter(|assignment| {
                assignment.employee_id == employee_id
                    && (!current_only || assignment.is_current_at(now))
            })
            .cloned()
            .collect())
    }

    async fn deactivate_due_assignments(&self, now: DateTime<Utc>) -> AppResult<Vec<Assignment>> {
        let mut state = self.state.lock().await;
        let mut expired = Vec::new();
        for assignment in &mut state.assignments {
            if assignment.is_stale_at(now) {
                assignment.is_active = false;
                expired.push(assignment.clone());
            }
        }
        for assignment in &expired {
            state.append_history(
                assignment.id,
                AssignmentChange::deactivated(Some(EXPIRED_REASON), None),
            );
        }
        Ok(expired)
    }

    async fn list_history(
        &self,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<AssignmentHistoryEntry>> {
        Ok(self
            .state
            .lock()
            .await
            .history
            .iter()
            .filter(|entry| entry.assignment_id == assignment_id)
            .cloned()
            .collect())
    }

    async fn list_holders(&self, assignable: AssignableRef) -> AppResult<Vec<EmployeeId>> {
        if self.fail_holder_lookups.load(Ordering::SeqCst) {
            let remaining = self.holder_lookups_before_failure.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(AppError::Internal("holder lookup unavailable".to_owned()));
            }
            self.holder_lookups_before_failure
                .store(remaining - 1, Ordering::SeqCst);
        }

        let now = Utc::now();
        let holders: BTreeSet<EmployeeId> = self
            .state
            .lock()
            .await
            .assignments
            .iter()
            .filter(|assignment| assignment.assignable == assignable && assignment.is_current_at(now))
            .map(|assignment| assignment.employee_id)
            .collect();
        Ok(holders.into_iter().collect())
    }

    async fn assignment_counts(&self) -> AppResult<AssignmentCounts> {
        let now = Utc::now();
        let state = self.state.lock().await;
        let mut counts = AssignmentCounts::default();
        for assignment in &state.assignments {
            counts.total += 1;
            if assignment.is_current_at(now) {
                counts.active += 1;
            }
            if assignment.is_stale_at(now) {
                counts.expired += 1;
            }
            if !assignment.is_active {
                counts.inactive += 1;
            }
            *counts
                .by_type
                .entry(assignment.assignable.assignable_type())
                .or_default() += 1;
        }
        Ok(counts)
    }

    async fn list_expiring(&self, days_ahead: u32) -> AppResult<Vec<Assignment>> {
        let now = Utc::now();
        let until = now + Duration::days(i64::from(days_ahead));
        let mut expiring: Vec<Assignment> = self
            .state
            .lock()
            .await
            .assignments
            .iter()
            .filter(|assignment| {
                assignment.is_current_at(now)
                    && assignment
                        .expires_at
                        .is_some_and(|expires_at| expires_at <= until)
            })
            .cloned()
            .collect();
        expiring.sort_by_key(|assignment| assignment.expires_at);
        Ok(expiring)
    }
}

#[async_trait]
impl PermissionSourceRepository for InMemoryRbacStore {
    async fn permission_breakdown(
        &self,
        employee_id: EmployeeId,
    ) -> AppResult<PermissionBreakdown> {
        self.breakdown_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        let mut breakdown = PermissionBreakdown::default();

        for assignment in state.current(employee_id) {
            match assignment.assignable {
                AssignableRef::Permission(permission_id) => {
                    if let Some(permission) = state
                        .permissions
                        .iter()
                        .find(|permission| permission.id == permission_id && !permission.is_deleted())
                    {
                        breakdown.direct.push(permission.clone());
                    }
                }
                AssignableRef::Role(role_id) => {
                    if let Some(role) = state.live_role(role_id) {
                        breakdown.through_roles.push(state.role_entry(role));
                    }
                }
                AssignableRef::Group(group_id) => {
                    if let Some(group) = state.live_group(group_id) {
                        let roles = state
                            .roles
                            .iter()
                            .filter(|role| role.group_id == Some(group_id) && !role.is_deleted())
                            .map(|role| state.role_entry(role))
                            .collect();
                        breakdown.through_groups.push(GroupPermissions {
                            group: group.clone(),
                            roles,
                        });
                    }
                }
            }
        }

        Ok(breakdown)
    }

    async fn has_direct_permission(&self, employee_id: EmployeeId, slug: &str) -> AppResult<bool> {
        let breakdown = self.permission_breakdown(employee_id).await?;
        Ok(breakdown.direct.iter().any(|permission| permission.slug() == slug))
    }

    async fn has_role_permission(&self, employee_id: EmployeeId, slug: &str) -> AppResult<bool> {
        let breakdown = self.permission_breakdown(employee_id).await?;
        Ok(breakdown
            .through_roles
            .iter()
            .flat_map(|entry| entry.permissions.iter())
            .any(|permission| permission.slug() == slug))
    }

    async fn has_group_role_permission(
        &self,
        employee_id: EmployeeId,
        slug: &str,
    ) -> AppResult<bool> {
        let breakdown = self.permission_breakdown(employee_id).await?;
        Ok(breakdown
            .through_groups
            .iter()
            .flat_map(|group| group.roles.iter())
            .flat_map(|entry| entry.permissions.iter())
            .any(|permission| permission.slug() == slug))
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRbacStore {
    async fn find_group(&self, group_id: GroupId) -> AppResult<Option<Group>> {
        Ok(self.state.lock().await.live_group(group_id).cloned())
    }

    async fn list_groups(&self) -> AppResult<Vec<Group>> {
        Ok(self
            .state
            .lock()
            .await
            .groups
            .iter()
            .filter(|group| !group.is_deleted())
            .cloned()
            .collect())
    }

    async fn group_links(&self) -> AppResult<Vec<(GroupId, Option<GroupId>)>> {
        Ok(self
            .state
            .lock()
            .await
            .groups
            .iter()
            .filter(|group| !group.is_deleted())
            .map(|group| (group.id, group.parent_id))
            .collect())
    }

    async fn create_group(&self, input: NewGroup) -> AppResult<Group> {
        let mut state = self.state.lock().await;
        if state.groups.iter().any(|group| group.slug == input.slug) {
            return Err(AppError::Conflict(format!(
                "group slug '{}' already exists",
                input.slug
            )));
        }
        let group = Group {
            id: GroupId::new(state.next_id()),
            name: input.name,
            slug: input.slug,
            description: input.description,
            parent_id: input.parent_id,
            is_system: input.is_system,
            deleted_at: None,
        };
        state.groups.push(group.clone());
        Ok(group)
    }

    async fn update_group(
        &self,
        group_id: GroupId,
        changes: CatalogEntryChanges,
    ) -> AppResult<Group> {
        let mut state = self.state.lock().await;
        let group = state
            .groups
            .iter_mut()
            .find(|group| group.id == group_id)
            .ok_or_else(|| AppError::NotFound(format!("group {group_id} not found")))?;
        group.name = changes.name;
        group.description = changes.description;
        Ok(group.clone())
    }

    async fn set_group_parent(
        &self,
        group_id: GroupId,
        parent_id: Option<GroupId>,
    ) -> AppResult<Group> {
        let mut state = self.state.lock().await;
        let group = state
            .groups
            .iter_mut()
            .find(|group| group.id == group_id)
            .ok_or_else(|| AppError::NotFound(format!("group {group_id} not found")))?;
        group.parent_id = parent_id;
        Ok(group.clone())
    }

    async fn count_group_dependents(&self, group_id: GroupId) -> AppResult<GroupDependents> {
        let state = self.state.lock().await;
        Ok(GroupDependents {
            child_groups: state
                .groups
                .iter()
                .filter(|group| group.parent_id == Some(group_id) && !group.is_deleted())
                .count() as u64,
            roles: state
                .roles
                .iter()
                .filter(|role| role.group_id == Some(group_id) && !role.is_deleted())
                .count() as u64,
        })
    }

    async fn soft_delete_group(&self, group_id: GroupId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(group) = state.groups.iter_mut().find(|group| group.id == group_id) {
            group.deleted_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.state.lock().await.live_role(role_id).cloned())
    }

    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        Ok(self
            .state
            .lock()
            .await
            .roles
            .iter()
            .filter(|role| !role.is_deleted())
            .cloned()
            .collect())
    }

    async fn list_group_roles(&self, group_id: GroupId) -> AppResult<Vec<Role>> {
        Ok(self
            .state
            .lock()
            .await
            .roles
            .iter()
            .filter(|role| role.group_id == Some(group_id) && !role.is_deleted())
            .cloned()
            .collect())
    }

    async fn create_role(&self, input: NewRole) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        if state.roles.iter().any(|role| role.slug == input.slug) {
            return Err(AppError::Conflict(format!(
                "role slug '{}' already exists",
                input.slug
            )));
        }
        let role = Role {
            id: RoleId::new(state.next_id()),
            name: input.name,
            slug: input.slug,
            description: input.description,
            group_id: input.group_id,
            is_system: input.is_system,
            deleted_at: None,
        };
        state.roles.push(role.clone());
        Ok(role)
    }

    async fn update_role(&self, role_id: RoleId, changes: CatalogEntryChanges) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        let role = state
            .roles
            .iter_mut()
            .find(|role| role.id == role_id)
            .ok_or_else(|| AppError::NotFound(format!("role {role_id} not found")))?;
        role.name = changes.name;
        role.description = changes.description;
        Ok(role.clone())
    }

    async fn set_role_group(&self, role_id: RoleId, group_id: Option<GroupId>) -> AppResult<Role> {
        if self.fail_role_moves_for.load(Ordering::SeqCst) == role_id.as_i64() {
            return Err(AppError::Internal(format!("failed to move role {role_id}")));
        }

        let mut state = self.state.lock().await;
        let role = state
            .roles
            .iter_mut()
            .find(|role| role.id == role_id)
            .ok_or_else(|| AppError::NotFound(format!("role {role_id} not found")))?;
        role.group_id = group_id;
        Ok(role.clone())
    }

    async fn soft_delete_role(&self, role_id: RoleId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(role) = state.roles.iter_mut().find(|role| role.id == role_id) {
            role.deleted_at = Some(Utc::now());
        }
        state
            .role_permissions
            .retain(|(linked_role, _)| *linked_role != role_id);
        Ok(())
    }

    async fn role_permission_ids(&self, role_id: RoleId) -> AppResult<Vec<PermissionId>> {
        Ok(self
            .state
            .lock()
            .await
            .role_permissions
            .iter()
            .filter(|(linked_role, _)| *linked_role == role_id)
            .map(|(_, permission_id)| *permission_id)
            .collect())
    }

    async fn attach_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<PermissionId>> {
        if self.fail_permission_attach.load(Ordering::SeqCst) {
            return Err(AppError::Internal(format!(
                "failed to attach permissions to role {role_id}"
            )));
        }

        let mut state = self.state.lock().await;
        Ok(permission_ids
            .iter()
            .copied()
            .filter(|permission_id| state.role_permissions.insert((role_id, *permission_id)))
            .collect())
    }

    async fn detach_role_permissions(
        &self,
        role_id: RoleId,
        permission_ids: &[PermissionId],
    ) -> AppResult<Vec<PermissionId>> {
        let mut state = self.state.lock().await;
        Ok(permission_ids
            .iter()
            .copied()
            .filter(|permission_id| state.role_permissions.remove(&(role_id, *permission_id)))
            .collect())
    }

    async fn find_permission(&self, permission_id: PermissionId) -> AppResult<Option<Permission>> {
        Ok(self
            .state
            .lock()
            .await
            .permissions
            .iter()
            .find(|permission| permission.id == permission_id && !permission.is_deleted())
            .cloned())
    }

    async fn find_permission_by_key(&self, key: &PermissionKey) -> AppResult<Option<Permission>> {
        Ok(self
            .state
            .lock()
            .await
            .permissions
            .iter()
            .find(|permission| &permission.key == key && !permission.is_deleted())
            .cloned())
    }

    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        Ok(self
            .state
            .lock()
            .await
            .permissions
            .iter()
            .filter(|permission| !permission.is_deleted())
            .cloned()
            .collect())
    }

    async fn create_permission(&self, input: NewPermission) -> AppResult<Permission> {
        let mut state = self.state.lock().await;
        if state
            .permissions
            .iter()
            .any(|permission| permission.key == input.key)
        {
            return Err(AppError::DuplicatePermission {
                module: input.key.module().to_owned(),
                action: input.key.action().to_owned(),
            });
        }
        let permission = Permission {
            id: PermissionId::new(state.next_id()),
            name: input.name.unwrap_or_else(|| input.key.display_name()),
            key: input.key,
            description: input.description,
            is_system: input.is_system,
            deleted_at: None,
        };
        state.permissions.push(permission.clone());
        Ok(permission)
    }

    async fn count_permission_dependents(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<PermissionDependents> {
        let state = self.state.lock().await;
        let now = Utc::now();
        Ok(PermissionDependents {
            roles: state
                .role_permissions
                .iter()
                .filter(|(_, linked)| *linked == permission_id)
                .count() as u64,
            direct_holders: state
                .assignments
                .iter()
                .filter(|assignment| {
                    assignment.assignable == AssignableRef::Permission(permission_id)
                        && assignment.is_current_at(now)
                })
                .count() as u64,
        })
    }

    async fn soft_delete_permission(&self, permission_id: PermissionId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(permission) = state
            .permissions
            .iter_mut()
            .find(|permission| permission.id == permission_id)
        {
            permission.deleted_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl EmployeeRepository for InMemoryRbacStore {
    async fn find_employee(&self, employee_id: EmployeeId) -> AppResult<Option<Employee>> {
        Ok(self
            .state
            .lock()
            .await
            .employees
            .iter()
            .find(|employee| employee.id == employee_id && employee.deleted_at.is_none())
            .cloned())
    }

    async fn find_employee_by_username(&self, username: &str) -> AppResult<Option<Employee>> {
        Ok(self
            .state
            .lock()
            .await
            .employees
            .iter()
            .find(|employee| employee.username == username && employee.deleted_at.is_none())
            .cloned())
    }

    async fn upsert_employee(&self, record: EmployeeRecord) -> AppResult<Employee> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(employee) = state
            .employees
            .iter_mut()
            .find(|employee| employee.username == record.username)
        {
            employee.employee_number = record.employee_number;
            employee.email = record.email;
            employee.first_name = record.first_name;
            employee.last_name = record.last_name;
            employee.department = record.department;
            employee.position = record.position;
            employee.is_active = record.is_active;
            employee.synced_at = Some(now);
            return Ok(employee.clone());
        }

        let employee = Employee {
            id: EmployeeId::new(state.next_id()),
            username: record.username,
            employee_number: record.employee_number,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            department: record.department,
            position: record.position,
            is_active: record.is_active,
            last_login_at: None,
            synced_at: Some(now),
            deleted_at: None,
        };
        state.employees.push(employee.clone());
        Ok(employee)
    }

    async fn record_login(&self, employee_id: EmployeeId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(employee) = state
            .employees
            .iter_mut()
            .find(|employee| employee.id == employee_id)
        {
            employee.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn deactivate_employee(&self, username: &str) -> AppResult<Option<Employee>> {
        let mut state = self.state.lock().await;
        Ok(state
            .employees
            .iter_mut()
            .find(|employee| employee.username == username && employee.deleted_at.is_none())
            .map(|employee| {
                employee.is_active = false;
                employee.clone()
            }))
    }
}

/// Cache fake with switchable failures.
#[derive(Default)]
pub(crate) struct FakePermissionCache {
    entries: Mutex<HashMap<EmployeeId, EffectivePermissionSet>>,
    pub(crate) fail_reads: AtomicBool,
    pub(crate) fail_writes: AtomicBool,
    pub(crate) fail_invalidations: AtomicBool,
}

impl FakePermissionCache {
    pub(crate) async fn seed(&self, employee_id: EmployeeId, permissions: EffectivePermissionSet) {
        self.entries.lock().await.insert(employee_id, permissions);
    }

    pub(crate) async fn cached(&self, employee_id: EmployeeId) -> Option<EffectivePermissionSet> {
        self.entries.lock().await.get(&employee_id).cloned()
    }
}

#[async_trait]
impl PermissionCache for FakePermissionCache {
    async fn get(&self, employee_id: EmployeeId) -> AppResult<Option<EffectivePermissionSet>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Internal("cache unavailable".to_owned()));
        }
        Ok(self.entries.lock().await.get(&employee_id).cloned())
    }

    async fn put(
        &self,
        employee_id: EmployeeId,
        permissions: &EffectivePermissionSet,
        _ttl_seconds: u32,
    ) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("cache unavailable".to_owned()));
        }
        self.entries
            .lock()
            .await
            .insert(employee_id, permissions.clone());
        Ok(())
    }

    async fn invalidate(&self, employee_id: EmployeeId) -> AppResult<()> {
        if self.fail_invalidations.load(Ordering::SeqCst) {
            return Err(AppError::Internal("cache unavailable".to_owned()));
        }
        self.entries.lock().await.remove(&employee_id);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditSink {
    pub(crate) events: Mutex<Vec<AuditEvent>>,
    pub(crate) fail: AtomicBool,
}

#[async_trait]
impl AuditSink for FakeAuditSink {
    async fn record(&self, event: AuditEvent) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Internal("audit store unavailable".to_owned()));
        }
        self.events.lock().await.push(event);
        Ok(())
    }
}

/// Accepts exactly the configured `(username, password)` pairs.
#[derive(Default)]
pub(crate) struct FakeAuthenticator {
    pub(crate) accounts: BTreeMap<String, String>,
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> AppResult<bool> {
        Ok(self
            .accounts
            .get(username)
            .is_some_and(|expected| expected == password))
    }

    async fn user_details(&self, username: &str) -> AppResult<DirectoryIdentity> {
        Ok(DirectoryIdentity::new(
            username,
            username.to_uppercase(),
            Some(format!("{username}@example.com")),
        ))
    }
}

#[derive(Default)]
pub(crate) struct FakeEmployeeSource {
    pub(crate) records: BTreeMap<String, EmployeeRecord>,
    pub(crate) fail: bool,
}

impl FakeEmployeeSource {
    pub(crate) fn with(records: impl IntoIterator<Item = EmployeeRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.username.clone(), record))
                .collect(),
            fail: false,
        }
    }
}

#[async_trait]
impl EmployeeSource for FakeEmployeeSource {
    async fn fetch(&self, username: &str) -> AppResult<Option<EmployeeRecord>> {
        if self.fail {
            return Err(AppError::Internal("employee api unreachable".to_owned()));
        }
        Ok(self.records.get(username).cloned())
    }
}

pub(crate) fn record(username: &str, is_active: bool) -> EmployeeRecord {
    EmployeeRecord {
        username: username.to_owned(),
        employee_number: Some(format!("E-{username}")),
        email: format!("{username}@example.com"),
        first_name: username.to_owned(),
        last_name: "Tester".to_owned(),
        department: Some("Engineering".to_owned()),
        position: None,
        is_active,
    }
}

/// Resolver, store and cache wired together for scenario tests.
pub(crate) struct Fixture {
    pub(crate) store: Arc<InMemoryRbacStore>,
    pub(crate) cache: Arc<FakePermissionCache>,
    pub(crate) audit: Arc<FakeAuditSink>,
    pub(crate) resolver: PermissionResolver,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let store = Arc::new(InMemoryRbacStore::default());
        let cache = Arc::new(FakePermissionCache::default());
        let resolver = PermissionResolver::new(
            store.clone(),
            cache.clone(),
            PermissionResolverConfig::default(),
        );
        Self {
            store,
            cache,
            audit: Arc::new(FakeAuditSink::default()),
            resolver,
        }
    }

    /// Seeds alice (1) and bob (2), group `staff` (5), role `editor` (10) in
    /// `staff`, role `viewer` (11) without group, permissions `posts.edit`
    /// (100), `posts.read` (101) and `posts.publish` (102). `editor` carries
    /// `posts.edit`, `viewer` carries `posts.read`.
    pub(crate) async fn seeded() -> Self {
        let fixture = Self::new();
        let store = &fixture.store;
        store.add_employee(1, "alice", true).await;
        store.add_employee(2, "bob", true).await;
        store.add_group(5, "staff", None).await;
        store.add_role(10, "editor", Some(5)).await;
        store.add_role(11, "viewer", None).await;
        store.add_permission(100, "posts", "edit").await;
        store.add_permission(101, "posts", "read").await;
        store.add_permission(102, "posts", "publish").await;
        store.link(10, 100).await;
        store.link(11, 101).await;
        fixture
    }
}
