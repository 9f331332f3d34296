use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use adrbac_core::AppResult;
use adrbac_domain::{AssignableType, Assignment};

use crate::AssignmentRepository;

/// Aggregate view over every assignment row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentStatistics {
    /// All rows, active or not.
    pub total: u64,
    /// Active rows that have not expired.
    pub active: u64,
    /// Active rows whose expiry has passed but were not swept yet.
    pub expired: u64,
    /// Deactivated rows.
    pub inactive: u64,
    /// Row count per assignable type.
    pub by_type: BTreeMap<AssignableType, u64>,
    /// `active / total` as a percentage rounded to two decimals.
    pub active_percentage: f64,
}

/// Read-only reporting over the assignment store.
#[derive(Clone)]
pub struct StatisticsService {
    assignments: Arc<dyn AssignmentRepository>,
}

impl StatisticsService {
    /// Creates a statistics service.
    #[must_use]
    pub fn new(assignments: Arc<dyn AssignmentRepository>) -> Self {
        Self { assignments }
    }

    /// Returns counts by status and by type.
    pub async fn statistics(&self) -> AppResult<AssignmentStatistics> {
        let counts = self.assignments.assignment_counts().await?;
        let mut by_type = counts.by_type;
        for assignable_type in AssignableType::all() {
            by_type.entry(*assignable_type).or_insert(0);
        }

        Ok(AssignmentStatistics {
            total: counts.total,
            active: counts.active,
            expired: counts.expired,
            inactive: counts.inactive,
            by_type,
            active_percentage: percentage(counts.active, counts.total),
        })
    }

    /// Returns current assignments expiring within `days_ahead` days,
    /// soonest first.
    pub async fn expiring_assignments(&self, days_ahead: u32) -> AppResult<Vec<Assignment>> {
        self.assignments.list_expiring(days_ahead).await
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}
