//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod assignment;
mod audit;
mod effective;
mod employee;
mod group;
mod permission;
mod role;

pub use assignment::{
    AssignableRef, AssignableType, Assignment, AssignmentChange, AssignmentHistoryAction,
    AssignmentHistoryEntry, AssignmentStatus, EXPIRED_REASON,
};
pub use audit::AuditAction;
pub use effective::EffectivePermissionSet;
pub use employee::{Employee, EmployeeRecord};
pub use group::{Group, GroupTree};
pub use permission::{
    Permission, PermissionKey, SPECIAL_ACTIONS, STANDARD_ACTIONS, derive_module_actions,
    snake_case,
};
pub use role::Role;
