use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use presence_core::types::{Address, EpochId};

/// What a lock protects: an epoch record or one presence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Epoch(EpochId),
    Presence(EpochId, Address),
}

/// Per-key mutual exclusion for read-modify-write cycles.
///
/// Each key gets its own mutex, created on demand and dropped again once no
/// caller holds or waits on it. Callers never hold two keys at once, so no
/// lock ordering is needed.
#[derive(Default)]
pub struct KeyLocks {
    slots: Mutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub fn with<R>(&self, key: LockKey, f: impl FnOnce() -> R) -> R {
        let slot = self.acquire_slot(key);
        let result = {
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release_slot(key, slot);
        result
    }

    /// Number of keys currently held or waited on.
    pub fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn acquire_slot(&self, key: LockKey) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    fn release_slot(&self, key: LockKey, slot: Arc<Mutex<()>>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one in `slot`: nobody else is waiting.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::thread;

    #[test]
    fn serializes_same_key() {
        let locks = Arc::new(KeyLocks::new());
        let inside = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));
        let key = LockKey::Epoch(EpochId::new(1));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (locks, inside, max_seen) = (locks.clone(), inside.clone(), max_seen.clone());
                thread::spawn(move || {
                    for _ in 0..50 {
                        locks.with(key, || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_seen.fetch_max(now, Ordering::SeqCst);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active(), 0);
    }

    #[test]
    fn distinct_keys_do_not_block() {
        let locks = KeyLocks::new();
        let a = LockKey::Presence(EpochId::new(1), Address::from_bytes([1; 20]));
        let b = LockKey::Presence(EpochId::new(1), Address::from_bytes([2; 20]));
        let value = locks.with(a, || locks.with(b, || 7));
        assert_eq!(value, 7);
        assert_eq!(locks.active(), 0);
    }
}
