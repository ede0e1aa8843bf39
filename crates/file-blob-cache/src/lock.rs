//! Per-key mutual exclusion with ephemeral registry entries
//!
//! Each key maps to a single-permit semaphore that lives in the registry only
//! while somebody holds or waits on it. Entries are pruned when the last
//! handle goes away; the reference count is checked under the same map shard
//! lock used by get-or-insert, so a new acquirer either sees the old
//! primitive or creates a fresh one after nobody can still be using the old.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

type Slots = DashMap<String, Arc<Semaphore>>;

/// Registry of per-key locks
#[derive(Default)]
pub struct KeyLockRegistry {
    slots: Arc<Slots>,
}

/// Returned when the registry was closed while waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryClosed;

impl KeyLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the caller is the sole holder of `key`.
    ///
    /// Dropping the returned future while it waits leaves no registry entry
    /// behind.
    pub async fn acquire(&self, key: &str) -> Result<KeyLockGuard, RegistryClosed> {
        let semaphore = self
            .slots
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();

        let slot = Slot {
            slots: Arc::clone(&self.slots),
            key: key.to_owned(),
            semaphore: Some(semaphore),
        };

        let Some(semaphore) = slot.semaphore.as_deref() else {
            return Err(RegistryClosed);
        };
        match semaphore.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(RegistryClosed),
        }

        debug!(key, "Acquired key lock");
        Ok(KeyLockGuard { slot })
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Close every outstanding primitive, waking waiters with [`RegistryClosed`],
    /// and forget them.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        self.slots.retain(|key, semaphore| {
            semaphore.close();
            debug!(key = %key, "Closed key lock");
            closed += 1;
            false
        });
        closed
    }
}

/// A registry handle for one key; prunes the entry once it is the last one
struct Slot {
    slots: Arc<Slots>,
    key: String,
    semaphore: Option<Arc<Semaphore>>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        let Some(semaphore) = self.semaphore.take() else {
            return;
        };
        drop(semaphore);
        // Map holds the last reference: nobody waits on or holds this key.
        self.slots
            .remove_if(&self.key, |_, semaphore| Arc::strong_count(semaphore) == 1);
    }
}

/// Exclusive hold on a key, released on drop
pub struct KeyLockGuard {
    slot: Slot,
}

impl KeyLockGuard {
    pub fn key(&self) -> &str {
        &self.slot.key
    }
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        if let Some(semaphore) = &self.slot.semaphore {
            semaphore.add_permits(1);
        }
        debug!(key = %self.slot.key, "Released key lock");
    }
}
