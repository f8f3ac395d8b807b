use std::sync::Arc;

use dashmap::DashMap;
use lnpay_core::UserId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Index-keyed mutual exclusion: one async mutex per user.
///
/// Holders for different users never contend.
#[derive(Default)]
pub struct UserLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `user_id`'s reservation section.
    pub async fn acquire(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the DashMap shard lock is not held across the await.
        let lock = self
            .locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop entries nobody is holding or waiting on.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
