use async_trait::async_trait;

use adrbac_core::{AppResult, EmployeeId};
use adrbac_domain::AuditAction;

/// Canonical audit event payload emitted by application use-cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Employee that performed the action, `None` for system jobs.
    pub actor: Option<EmployeeId>,
    /// Stable audit action identifier.
    pub action: AuditAction,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Optional audit detail payload.
    pub detail: Option<String>,
}

/// Port for persisting append-only audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one audit event.
    async fn record(&self, event: AuditEvent) -> AppResult<()>;
}
