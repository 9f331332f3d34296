//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_employee_source;
mod in_memory_permission_cache;
mod postgres_assignment_repository;
mod postgres_audit_sink;
mod postgres_catalog_repository;
mod postgres_employee_repository;
mod postgres_permission_source_repository;
mod redis_permission_cache;

pub use http_employee_source::{HttpEmployeeSource, HttpEmployeeSourceConfig};
pub use in_memory_permission_cache::InMemoryPermissionCache;
pub use postgres_assignment_repository::PostgresAssignmentRepository;
pub use postgres_audit_sink::PostgresAuditSink;
pub use postgres_catalog_repository::PostgresCatalogRepository;
pub use postgres_employee_repository::PostgresEmployeeRepository;
pub use postgres_permission_source_repository::PostgresPermissionSourceRepository;
pub use redis_permission_cache::RedisPermissionCache;
