//! presence-cache
//!
//! Epoch-scoped ephemeral storage. Everything written here belongs to one
//! epoch and is removed wholesale by `purge_epoch` once that epoch closes.
//!
//! Failures never propagate: a value that cannot be written, read or decoded
//! is logged and treated as absent, since ephemeral data is disposable.

pub mod key;
pub mod memory;
pub mod sled_cache;

use presence_core::types::EpochId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

pub use key::CacheKey;
pub use memory::MemoryCache;
pub use sled_cache::SledCache;

/// Byte-level ephemeral store scoped by epoch.
pub trait EphemeralCache: Send + Sync {
    /// Write `value` under `(epoch_id, key)`. Returns false if the write was dropped.
    fn store_bytes(&self, epoch_id: EpochId, key: &str, value: Vec<u8>) -> bool;

    fn retrieve_bytes(&self, epoch_id: EpochId, key: &str) -> Option<Vec<u8>>;

    fn delete(&self, epoch_id: EpochId, key: &str);

    fn exists(&self, epoch_id: EpochId, key: &str) -> bool;

    /// Remove every key stored under `epoch_id`. Returns the number removed.
    fn purge_epoch(&self, epoch_id: EpochId) -> usize;

    /// Distinct epochs currently holding at least one entry, ascending.
    fn cached_epoch_ids(&self) -> Vec<EpochId>;

    /// Purge a batch of closed epochs. Returns the total number of keys removed.
    fn purge_expired_epochs(&self, closed: &[EpochId]) -> usize {
        closed.iter().map(|id| self.purge_epoch(*id)).sum()
    }
}

/// Typed access on top of [`EphemeralCache`], encoding values as JSON.
pub trait EphemeralCacheExt: EphemeralCache {
    fn store<T: Serialize>(&self, epoch_id: EpochId, key: &str, value: &T) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.store_bytes(epoch_id, key, bytes),
            Err(e) => {
                warn!(epoch_id = %epoch_id, key, error = %e, "dropping unserializable cache value");
                false
            }
        }
    }

    fn retrieve<T: DeserializeOwned>(&self, epoch_id: EpochId, key: &str) -> Option<T> {
        let bytes = self.retrieve_bytes(epoch_id, key)?;
        match serde_json::from_slice(&bytes) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(epoch_id = %epoch_id, key, error = %e, "cache value did not decode; treating as absent");
                None
            }
        }
    }
}

impl<C: EphemeralCache + ?Sized> EphemeralCacheExt for C {}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every cache implementation must share.

    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Post {
        author: String,
        body: String,
    }

    pub fn store_and_retrieve(cache: &dyn EphemeralCache) {
        let e = EpochId::new(1);
        let post = Post { author: "0xabc".into(), body: "gm".into() };
        assert!(cache.store(e, "post:1", &post));
        assert!(cache.exists(e, "post:1"));
        assert_eq!(cache.retrieve::<Post>(e, "post:1"), Some(post));
        assert!(!cache.exists(EpochId::new(2), "post:1"));
        assert_eq!(cache.retrieve::<Post>(EpochId::new(2), "post:1"), None);
    }

    pub fn type_mismatch_is_absent(cache: &dyn EphemeralCache) {
        let e = EpochId::new(4);
        assert!(cache.store(e, "n", &42u32));
        assert_eq!(cache.retrieve::<Post>(e, "n"), None);
        assert_eq!(cache.retrieve::<u32>(e, "n"), Some(42));
        cache.store_bytes(e, "garbage", b"{not json".to_vec());
        assert_eq!(cache.retrieve::<u32>(e, "garbage"), None);
    }

    pub fn delete_removes_single_key(cache: &dyn EphemeralCache) {
        let e = EpochId::new(5);
        cache.store(e, "a", &1u8);
        cache.store(e, "b", &2u8);
        cache.delete(e, "a");
        assert!(!cache.exists(e, "a"));
        assert!(cache.exists(e, "b"));
        // Deleting a missing key is harmless.
        cache.delete(e, "missing");
    }

    pub fn purge_is_complete(cache: &dyn EphemeralCache) {
        let keep = EpochId::new(10);
        let gone = EpochId::new(11);
        let keys = ["post:1", "post:2", "thread:alice/bob", "media/2024/x.jpg"];
        for k in keys {
            cache.store(gone, k, &k);
            cache.store(keep, k, &k);
        }
        // Epoch 1 must not be confused with epoch 11 or 10.
        cache.store(EpochId::new(1), "post:1", &"one");

        assert_eq!(cache.purge_epoch(gone), keys.len());
        for k in keys {
            assert!(!cache.exists(gone, k), "{k} survived purge");
            assert!(cache.exists(keep, k));
        }
        let ids = cache.cached_epoch_ids();
        assert!(!ids.contains(&gone));
        assert_eq!(ids, vec![EpochId::new(1), keep]);
        assert_eq!(cache.purge_epoch(gone), 0);
    }

    pub fn batch_purge(cache: &dyn EphemeralCache) {
        for id in 20..25u64 {
            cache.store(EpochId::new(id), "k", &id);
        }
        let removed = cache.purge_expired_epochs(&[EpochId::new(20), EpochId::new(22), EpochId::new(99)]);
        assert_eq!(removed, 2);
        assert_eq!(
            cache.cached_epoch_ids(),
            vec![EpochId::new(21), EpochId::new(23), EpochId::new(24)]
        );
    }
}
