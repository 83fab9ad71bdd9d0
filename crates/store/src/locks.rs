//! Per-user storage locks.
//!
//! Each user id maps to a `tokio::sync::RwLock<()>` guarding that user's
//! record file. Entries are created on first use and never evicted; the
//! number of users is bounded by the account file.

use std::collections::HashMap;
use std::sync::Arc;

use hl_domain::UserId;
use parking_lot::Mutex;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

pub struct UserLockMap {
    locks: Mutex<HashMap<UserId, Arc<RwLock<()>>>>,
}

impl Default for UserLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl UserLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock for `user`, created on first reference. Two concurrent
    /// callers always receive the same instance.
    pub fn lock_for(&self, user: &UserId) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(user.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Shared access for plain reads.
    pub async fn read(&self, user: &UserId) -> OwnedRwLockReadGuard<()> {
        self.lock_for(user).read_owned().await
    }

    /// Exclusive access for writes and read-modify-write sequences.
    pub async fn write(&self, user: &UserId) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(user).write_owned().await
    }

    /// Number of users that have been touched since startup.
    pub fn user_count(&self) -> usize {
        self.locks.lock().len()
    }
}
