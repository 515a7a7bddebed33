//! Concurrency groups - one active publication per key

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type GroupTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

fn table(groups: &GroupTable) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
    groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keyed lock table owned by the publication pipeline.
///
/// Each key maps to a tokio mutex, whose waiters are woken in FIFO order, so
/// jobs sharing a key run one after another in arrival order. Nothing is ever
/// cancelled; a waiter simply holds its place until the job ahead releases.
/// An entry lives only while some job holds or waits for its group.
#[derive(Debug, Default)]
pub struct ConcurrencyGroups {
    groups: GroupTable,
}

/// Held for as long as a job occupies its group
pub struct GroupSlot {
    key: String,
    groups: GroupTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl GroupSlot {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for GroupSlot {
    fn drop(&mut self) {
        let mut groups = table(&self.groups);
        // Release under the table lock so no newcomer clones the entry in between
        self.guard.take();
        // Only the table's own reference left: nobody holds or waits
        if groups
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            groups.remove(&self.key);
        }
    }
}

impl ConcurrencyGroups {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        Arc::clone(table(&self.groups).entry(key.to_string()).or_default())
    }

    /// Wait for the group to be free and occupy it
    pub async fn acquire(&self, key: &str) -> GroupSlot {
        let lock = self.lock_for(key);
        let guard = lock.lock_owned().await;
        GroupSlot {
            key: key.to_string(),
            groups: Arc::clone(&self.groups),
            guard: Some(guard),
        }
    }

    /// Whether a job currently occupies the group
    pub fn is_busy(&self, key: &str) -> bool {
        table(&self.groups)
            .get(key)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        table(&self.groups).len()
    }
}
