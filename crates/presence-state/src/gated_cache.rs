use std::sync::Arc;

use presence_cache::EphemeralCache;
use presence_core::clock::Clock;
use presence_core::epoch::EpochState;
use presence_core::types::EpochId;
use tracing::{debug, warn};

use crate::store::PresenceStore;

/// [`EphemeralCache`] that only serves epochs which are scheduled or active.
///
/// Once an epoch closes its entries can no longer be written or read, even
/// before the phase monitor gets round to purging them. Unknown epochs are
/// refused as well. Deletes, purges and the epoch listing pass straight
/// through so cleanup is never blocked.
pub struct EpochGatedCache {
    inner: Arc<dyn EphemeralCache>,
    store: Arc<dyn PresenceStore>,
    clock: Arc<dyn Clock>,
}

impl EpochGatedCache {
    pub fn new(
        inner: Arc<dyn EphemeralCache>,
        store: Arc<dyn PresenceStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { inner, store, clock }
    }

    /// Phase of `epoch_id` right now; storage failures read as `none`.
    pub fn epoch_state(&self, epoch_id: EpochId) -> EpochState {
        match self.store.get_epoch(epoch_id) {
            Ok(Some(epoch)) => epoch.state(self.clock.now()),
            Ok(None) => EpochState::None,
            Err(e) => {
                warn!(epoch_id = %epoch_id, error = %e, "epoch lookup failed; cache access refused");
                EpochState::None
            }
        }
    }

    fn is_open(&self, epoch_id: EpochId) -> bool {
        matches!(
            self.epoch_state(epoch_id),
            EpochState::Scheduled | EpochState::Active
        )
    }
}

impl EphemeralCache for EpochGatedCache {
    fn store_bytes(&self, epoch_id: EpochId, key: &str, value: Vec<u8>) -> bool {
        let state = self.epoch_state(epoch_id);
        if !matches!(state, EpochState::Scheduled | EpochState::Active) {
            debug!(epoch_id = %epoch_id, key, state = %state, "cache write refused");
            return false;
        }
        self.inner.store_bytes(epoch_id, key, value)
    }

    fn retrieve_bytes(&self, epoch_id: EpochId, key: &str) -> Option<Vec<u8>> {
        if !self.is_open(epoch_id) {
            return None;
        }
        self.inner.retrieve_bytes(epoch_id, key)
    }

    fn delete(&self, epoch_id: EpochId, key: &str) {
        self.inner.delete(epoch_id, key)
    }

    fn exists(&self, epoch_id: EpochId, key: &str) -> bool {
        self.is_open(epoch_id) && self.inner.exists(epoch_id, key)
    }

    fn purge_epoch(&self, epoch_id: EpochId) -> usize {
        self.inner.purge_epoch(epoch_id)
    }

    fn cached_epoch_ids(&self) -> Vec<EpochId> {
        self.inner.cached_epoch_ids()
    }
}
