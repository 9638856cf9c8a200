use std::path::Path;
use std::sync::Arc;

use presence_cache::{EphemeralCache, MemoryCache};
use presence_consensus::{PhaseMonitor, QuorumValidator};
use presence_core::clock::{Clock, SystemClock};
use presence_core::error::PresenceError;
use presence_core::types::Timestamp;
use presence_query::EpochQuery;
use presence_state::{
    seed_epochs, EpochGatedCache, EpochSpec, MemoryStore, PresenceEngine, PresenceStore, StateDb,
};
use tracing::info;

use crate::config::NodeConfig;

/// A running presence node: one engine with its validator, monitor and cache.
///
/// `cache` only serves epochs that have not closed yet; the monitor purges
/// the rest on its next tick.
pub struct Node {
    pub engine: Arc<PresenceEngine>,
    pub validator: QuorumValidator,
    pub monitor: PhaseMonitor,
    pub cache: Arc<dyn EphemeralCache>,
    clock: Arc<dyn Clock>,
    db: Option<Arc<StateDb>>,
}

impl Node {
    /// Everything in memory; nothing survives the process.
    pub fn in_memory(config: NodeConfig) -> Result<Self, PresenceError> {
        Self::in_memory_with_clock(config, Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(
        config: NodeConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PresenceError> {
        let store: Arc<dyn PresenceStore> = Arc::new(MemoryStore::new());
        Self::assemble(store, Arc::new(MemoryCache::new()), None, clock, config)
    }

    /// Open (or create) the sled database under `data_dir`.
    pub fn open(data_dir: &Path, config: NodeConfig) -> Result<Self, PresenceError> {
        let db = Arc::new(StateDb::open(data_dir)?);
        let cache: Arc<dyn EphemeralCache> = Arc::new(db.ephemeral_cache()?);
        // Share the same DB handle for the store.
        let store: Arc<dyn PresenceStore> = Arc::clone(&db) as Arc<dyn PresenceStore>;
        info!(path = %data_dir.display(), epochs = db.epoch_count(), "state database opened");
        Self::assemble(store, cache, Some(db), Arc::new(SystemClock), config)
    }

    fn assemble(
        store: Arc<dyn PresenceStore>,
        raw_cache: Arc<dyn EphemeralCache>,
        db: Option<Arc<StateDb>>,
        clock: Arc<dyn Clock>,
        config: NodeConfig,
    ) -> Result<Self, PresenceError> {
        config.validate()?;
        let engine = Arc::new(PresenceEngine::new(Arc::clone(&store)));
        let cache: Arc<dyn EphemeralCache> =
            Arc::new(EpochGatedCache::new(raw_cache, store, Arc::clone(&clock)));
        let validator = QuorumValidator::new(Arc::clone(&engine), config.quorum)?;
        let monitor = PhaseMonitor::new(Arc::clone(&engine), Arc::clone(&cache), config.monitor)?;
        Ok(Self { engine, validator, monitor, cache, clock, db })
    }

    /// Current time according to the node's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn query(&self) -> EpochQuery<'_> {
        EpochQuery::new(self.engine.store().as_ref())
    }

    pub fn seed(&self, specs: Vec<EpochSpec>) -> Result<usize, PresenceError> {
        seed_epochs(&self.engine, specs)
    }

    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    /// Flush pending writes; a no-op in memory mode.
    pub fn flush(&self) -> Result<(), PresenceError> {
        match &self.db {
            Some(db) => db.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_cache::EphemeralCacheExt;
    use presence_core::clock::ManualClock;
    use presence_core::epoch::{Epoch, EpochCapability};
    use presence_core::types::{Address, EpochId};

    #[test]
    fn persistent_node_reopens_with_state() {
        let dir = std::env::temp_dir().join(format!("presence_node_reopen_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let id = EpochId::new(5);
        let actor = Address::from_bytes([7; 20]);
        {
            let node = Node::open(&dir, NodeConfig::default()).unwrap();
            assert!(node.is_persistent());
            node.engine
                .schedule_epoch(Epoch::new(id, 0, i64::MAX, EpochCapability::PresenceWithEphemeralData))
                .unwrap();
            node.engine.declare_presence(id, actor, None, 10).unwrap();
            node.cache.store(id, "post:1", &"hello");
            node.flush().unwrap();
        }
        let node = Node::open(&dir, NodeConfig::default()).unwrap();
        assert_eq!(node.engine.epoch(id).unwrap().participant_count, 1);
        assert_eq!(node.cache.retrieve::<String>(id, "post:1").as_deref(), Some("hello"));
        drop(node);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cache_closes_with_the_epoch() {
        let clock = Arc::new(ManualClock::new(1_000));
        let node = Node::in_memory_with_clock(NodeConfig::default(), Arc::clone(&clock) as Arc<dyn Clock>)
            .unwrap();
        let id = EpochId::new(3);
        node.engine
            .schedule_epoch(Epoch::new(id, 1_000, 1_060, EpochCapability::PresenceWithEphemeralData))
            .unwrap();
        assert_eq!(node.now(), 1_000);
        assert!(node.cache.store(id, "post:1", &"gm"));

        clock.set(1_060);
        assert!(!node.cache.store(id, "post:2", &"too late"));
        assert_eq!(node.cache.retrieve::<String>(id, "post:1"), None);

        node.engine.finalize_epoch(id, node.now()).unwrap();
        assert!(!node.cache.store(id, "post:3", &"after finalize"));
        assert_eq!(node.cache.retrieve::<String>(id, "post:1"), None);

        let report = node.monitor.tick(node.now()).unwrap();
        assert_eq!(report.purged, vec![(id, 1)]);
        assert!(node.cache.cached_epoch_ids().is_empty());
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = NodeConfig::default();
        config.quorum.quorum_size = 0;
        assert!(matches!(Node::in_memory(config), Err(PresenceError::Configuration(_))));
    }
}
