use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use presence_core::types::EpochId;
use tracing::{debug, warn};

use crate::EphemeralCache;

/// In-process ephemeral cache. Nothing survives a restart, which is fine:
/// nothing here is meant to outlive its epoch anyway.
#[derive(Default)]
pub struct MemoryCache {
    epochs: RwLock<BTreeMap<EpochId, HashMap<String, Vec<u8>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all epochs.
    pub fn len(&self) -> usize {
        self.epochs
            .read()
            .map(|m| m.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EphemeralCache for MemoryCache {
    fn store_bytes(&self, epoch_id: EpochId, key: &str, value: Vec<u8>) -> bool {
        match self.epochs.write() {
            Ok(mut m) => {
                m.entry(epoch_id).or_default().insert(key.to_string(), value);
                true
            }
            Err(_) => {
                warn!(epoch_id = %epoch_id, key, "ephemeral cache lock poisoned; dropping write");
                false
            }
        }
    }

    fn retrieve_bytes(&self, epoch_id: EpochId, key: &str) -> Option<Vec<u8>> {
        let m = self.epochs.read().ok()?;
        m.get(&epoch_id)?.get(key).cloned()
    }

    fn delete(&self, epoch_id: EpochId, key: &str) {
        if let Ok(mut m) = self.epochs.write() {
            if let Some(entries) = m.get_mut(&epoch_id) {
                entries.remove(key);
                if entries.is_empty() {
                    m.remove(&epoch_id);
                }
            }
        }
    }

    fn exists(&self, epoch_id: EpochId, key: &str) -> bool {
        self.epochs
            .read()
            .map(|m| m.get(&epoch_id).is_some_and(|e| e.contains_key(key)))
            .unwrap_or(false)
    }

    fn purge_epoch(&self, epoch_id: EpochId) -> usize {
        let removed = match self.epochs.write() {
            Ok(mut m) => m.remove(&epoch_id).map(|e| e.len()).unwrap_or(0),
            Err(_) => {
                warn!(epoch_id = %epoch_id, "ephemeral cache lock poisoned; purge skipped");
                0
            }
        };
        debug!(epoch_id = %epoch_id, removed, "purged epoch from memory cache");
        removed
    }

    fn cached_epoch_ids(&self) -> Vec<EpochId> {
        self.epochs
            .read()
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract;

    #[test]
    fn store_and_retrieve() {
        contract::store_and_retrieve(&MemoryCache::new());
    }

    #[test]
    fn type_mismatch_is_absent() {
        contract::type_mismatch_is_absent(&MemoryCache::new());
    }

    #[test]
    fn delete_removes_single_key() {
        contract::delete_removes_single_key(&MemoryCache::new());
    }

    #[test]
    fn purge_is_complete() {
        contract::purge_is_complete(&MemoryCache::new());
    }

    #[test]
    fn batch_purge() {
        contract::batch_purge(&MemoryCache::new());
    }

    #[test]
    fn last_delete_drops_epoch() {
        let cache = MemoryCache::new();
        let e = EpochId::new(3);
        cache.store_bytes(e, "only", vec![1]);
        assert_eq!(cache.cached_epoch_ids(), vec![e]);
        cache.delete(e, "only");
        assert!(cache.cached_epoch_ids().is_empty());
        assert!(cache.is_empty());
    }
}
