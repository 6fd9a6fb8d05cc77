//! Per-conversation write serialization

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use livechat_shared::ConversationId;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<ConversationId, Arc<Mutex<()>>>;

/// One async mutex per conversation id.
///
/// Guards the read-modify-write sequences on a single conversation (survey
/// updates, takeover, close, and the automated reply's re-check + append)
/// without a global lock. An entry lives only while someone holds or waits
/// on it.
#[derive(Default)]
pub struct ConversationLocks {
    locks: Arc<StdMutex<LockMap>>,
}

/// Held conversation lock. Releasing the last reference removes the entry.
pub struct ConversationGuard {
    id: ConversationId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<StdMutex<LockMap>>,
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        // Release first so the entry's only remaining reference is the map's
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: ConversationId) -> ConversationGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id).or_default())
        };

        ConversationGuard {
            id,
            guard: Some(lock.lock_owned().await),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of conversations currently locked or awaited
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
