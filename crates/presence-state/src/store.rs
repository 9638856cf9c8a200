use std::collections::BTreeMap;
use std::sync::RwLock;

use presence_core::epoch::Epoch;
use presence_core::error::PresenceError;
use presence_core::presence::Presence;
use presence_core::types::{Address, EpochId};

/// Durable storage for epoch and presence records.
///
/// Implementations only need to be consistent per call; the engine
/// serializes read-modify-write cycles per key through [`crate::KeyLocks`].
pub trait PresenceStore: Send + Sync {
    fn get_epoch(&self, id: EpochId) -> Result<Option<Epoch>, PresenceError>;

    fn put_epoch(&self, epoch: &Epoch) -> Result<(), PresenceError>;

    fn list_epochs(&self) -> Result<Vec<Epoch>, PresenceError>;

    fn get_presence(
        &self,
        epoch_id: EpochId,
        actor: &Address,
    ) -> Result<Option<Presence>, PresenceError>;

    fn put_presence(&self, presence: &Presence) -> Result<(), PresenceError>;

    /// Every stored presence of an epoch, ordered by actor address.
    fn list_presences(&self, epoch_id: EpochId) -> Result<Vec<Presence>, PresenceError>;
}

/// In-memory [`PresenceStore`], used by tests and `--memory` nodes.
#[derive(Default)]
pub struct MemoryStore {
    epochs: RwLock<BTreeMap<EpochId, Epoch>>,
    presences: RwLock<BTreeMap<(EpochId, Address), Presence>>,
}

fn poisoned<T>(_: T) -> PresenceError {
    PresenceError::Storage("memory store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceStore for MemoryStore {
    fn get_epoch(&self, id: EpochId) -> Result<Option<Epoch>, PresenceError> {
        Ok(self.epochs.read().map_err(poisoned)?.get(&id).cloned())
    }

    fn put_epoch(&self, epoch: &Epoch) -> Result<(), PresenceError> {
        self.epochs
            .write()
            .map_err(poisoned)?
            .insert(epoch.id, epoch.clone());
        Ok(())
    }

    fn list_epochs(&self) -> Result<Vec<Epoch>, PresenceError> {
        Ok(self.epochs.read().map_err(poisoned)?.values().cloned().collect())
    }

    fn get_presence(
        &self,
        epoch_id: EpochId,
        actor: &Address,
    ) -> Result<Option<Presence>, PresenceError> {
        Ok(self
            .presences
            .read()
            .map_err(poisoned)?
            .get(&(epoch_id, *actor))
            .cloned())
    }

    fn put_presence(&self, presence: &Presence) -> Result<(), PresenceError> {
        self.presences
            .write()
            .map_err(poisoned)?
            .insert((presence.epoch_id, presence.actor), presence.clone());
        Ok(())
    }

    fn list_presences(&self, epoch_id: EpochId) -> Result<Vec<Presence>, PresenceError> {
        let map = self.presences.read().map_err(poisoned)?;
        Ok(map
            .range((epoch_id, Address::from_bytes([0u8; 20]))..=(epoch_id, Address::from_bytes([0xFF; 20])))
            .map(|(_, p)| p.clone())
            .collect())
    }
}
