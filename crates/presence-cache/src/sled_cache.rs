use std::path::Path;

use presence_core::error::PresenceError;
use presence_core::types::EpochId;
use tracing::{debug, warn};

use crate::key::CacheKey;
use crate::EphemeralCache;

/// Ephemeral cache backed by a sled tree.
///
/// Keys follow [`CacheKey`]'s `<epoch>/<key>` layout so an epoch's entries
/// are one contiguous prefix range.
pub struct SledCache {
    tree: sled::Tree,
}

impl SledCache {
    /// Name of the tree inside a shared sled database.
    pub const TREE: &'static str = "ephemeral";

    /// Open a standalone cache database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PresenceError> {
        let db = sled::open(path).map_err(|e| PresenceError::Storage(e.to_string()))?;
        Self::from_db(&db)
    }

    /// Use the `ephemeral` tree of an already open database.
    pub fn from_db(db: &sled::Db) -> Result<Self, PresenceError> {
        let tree = db
            .open_tree(Self::TREE)
            .map_err(|e| PresenceError::Storage(e.to_string()))?;
        Ok(Self { tree })
    }

    pub fn flush(&self) -> Result<(), PresenceError> {
        self.tree
            .flush()
            .map_err(|e| PresenceError::Storage(e.to_string()))?;
        Ok(())
    }
}

impl EphemeralCache for SledCache {
    fn store_bytes(&self, epoch_id: EpochId, key: &str, value: Vec<u8>) -> bool {
        let k = CacheKey::new(epoch_id, key);
        match self.tree.insert(k.as_bytes(), value) {
            Ok(_) => true,
            Err(e) => {
                warn!(epoch_id = %epoch_id, key, error = %e, "ephemeral write failed");
                false
            }
        }
    }

    fn retrieve_bytes(&self, epoch_id: EpochId, key: &str) -> Option<Vec<u8>> {
        let k = CacheKey::new(epoch_id, key);
        match self.tree.get(k.as_bytes()) {
            Ok(v) => v.map(|iv| iv.to_vec()),
            Err(e) => {
                warn!(epoch_id = %epoch_id, key, error = %e, "ephemeral read failed");
                None
            }
        }
    }

    fn delete(&self, epoch_id: EpochId, key: &str) {
        let k = CacheKey::new(epoch_id, key);
        if let Err(e) = self.tree.remove(k.as_bytes()) {
            warn!(epoch_id = %epoch_id, key, error = %e, "ephemeral delete failed");
        }
    }

    fn exists(&self, epoch_id: EpochId, key: &str) -> bool {
        let k = CacheKey::new(epoch_id, key);
        self.tree.contains_key(k.as_bytes()).unwrap_or(false)
    }

    fn purge_epoch(&self, epoch_id: EpochId) -> usize {
        let prefix = CacheKey::prefix(epoch_id);
        let mut batch = sled::Batch::default();
        let mut removed = 0;
        for item in self.tree.scan_prefix(prefix.as_bytes()).keys() {
            match item {
                Ok(key) => {
                    batch.remove(key);
                    removed += 1;
                }
                Err(e) => warn!(epoch_id = %epoch_id, error = %e, "skipping unreadable key during purge"),
            }
        }
        if let Err(e) = self.tree.apply_batch(batch) {
            warn!(epoch_id = %epoch_id, error = %e, "ephemeral purge failed");
            return 0;
        }
        debug!(epoch_id = %epoch_id, removed, "purged epoch from sled cache");
        removed
    }

    fn cached_epoch_ids(&self) -> Vec<EpochId> {
        let mut ids: Vec<EpochId> = Vec::new();
        for item in self.tree.iter().keys() {
            let Ok(key) = item else { continue };
            if let Some(id) = CacheKey::epoch_of(&key) {
                // Keys are sorted, so equal epochs are adjacent.
                if ids.last() != Some(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}
