use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use adrbac_core::EmployeeId;

/// In-process record of invalidations.
///
/// `epoch` increases on every invalidation. `bypass` holds employees whose
/// cached entry could not be deleted and must not be read from the cache.
#[derive(Debug, Default)]
pub(super) struct InvalidationLedger {
    epoch: AtomicU64,
    bypass: Mutex<HashSet<EmployeeId>>,
}

impl InvalidationLedger {
    pub(super) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(super) fn advance(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub(super) fn is_bypassed(&self, employee_id: EmployeeId) -> bool {
        self.bypass
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&employee_id)
    }

    pub(super) fn mark_bypass(&self, employee_id: EmployeeId) {
        self.bypass
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(employee_id);
    }

    pub(super) fn clear_bypass(&self, employee_id: EmployeeId) {
        self.bypass
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&employee_id);
    }
}
