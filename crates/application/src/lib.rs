//! Application services and ports.

#![forbid(unsafe_code)]

mod assignment_ports;
mod assignment_service;
mod audit_ports;
mod catalog_ports;
mod catalog_service;
mod employee_ports;
mod employee_service;
mod permission_ports;
mod permission_resolver;
mod statistics_service;

#[cfg(test)]
mod test_support;

pub use assignment_ports::{
    AssignManyOutcome, AssignmentCounts, AssignmentRepository, AssignmentRequest, AttachOutcome,
    BulkAssignOutcome, GrantOptions, ItemFailure, NewAssignment, SyncOutcome,
    UnassignManyOutcome,
};
pub use assignment_service::AssignmentService;
pub use audit_ports::{AuditEvent, AuditSink};
pub use catalog_ports::{
    CatalogEntryChanges, CatalogRepository, GroupDependents, GroupRoleChange, NewGroup,
    NewPermission, NewRole, PermissionDependents, RolePermissionChange,
};
pub use catalog_service::CatalogService;
pub use employee_ports::{Authenticator, EmployeeRepository, EmployeeSource};
pub use employee_service::{
    AuthService, EmployeeSyncReport, EmployeeSyncResult, EmployeeSyncService, LoginOutcome,
};
pub use permission_ports::{
    GroupPermissions, PermissionBreakdown, PermissionCache, PermissionSourceRepository,
    RolePermissions,
};
pub use permission_resolver::{PermissionResolver, PermissionResolverConfig};
pub use statistics_service::{AssignmentStatistics, StatisticsService};
