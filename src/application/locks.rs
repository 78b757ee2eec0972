use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::UserId;

/// One async mutex per business, created on demand.
///
/// Writers to the same business queue behind each other; writers to
/// different businesses never touch the same lock. Idle entries are pruned
/// whenever a new lock is handed out.
#[derive(Default)]
pub struct BusinessLocks {
    slots: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl BusinessLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `business_id`'s ledger.
    pub async fn acquire(&self, business_id: UserId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Only the map holds a reference to an idle slot.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(business_id).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Number of businesses with a writer holding or waiting on their lock.
    pub fn active(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}
