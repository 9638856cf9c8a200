use presence_cache::SledCache;
use presence_core::epoch::Epoch;
use presence_core::error::PresenceError;
use presence_core::presence::Presence;
use presence_core::types::{Address, EpochId};
use std::path::Path;
use tracing::info;

use crate::store::PresenceStore;

/// Persistent state database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   epochs      EpochId BE bytes                → bincode(Epoch)
///   presences   EpochId BE bytes ‖ address (20) → bincode(Presence)
///   meta        utf8 key bytes                  → raw bytes (schema version)
///   ephemeral   owned by [`SledCache`]
pub struct StateDb {
    db: sled::Db,
    epochs: sled::Tree,
    presences: sled::Tree,
    meta: sled::Tree,
}

/// Layout version of the durable trees. Bump on any incompatible change.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_KEY: &str = "schema_version";

fn storage(e: sled::Error) -> PresenceError {
    PresenceError::Storage(e.to_string())
}

fn serialization(e: bincode::Error) -> PresenceError {
    PresenceError::Serialization(e.to_string())
}

fn presence_key(epoch_id: EpochId, actor: &Address) -> [u8; 28] {
    let mut key = [0u8; 28];
    key[..8].copy_from_slice(&epoch_id.to_be_bytes());
    key[8..].copy_from_slice(actor.as_bytes());
    key
}

impl StateDb {
    /// Open or create the state database at `path`.
    ///
    /// A fresh database is stamped with [`SCHEMA_VERSION`]; an existing one
    /// written with a different version is refused.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PresenceError> {
        let db = sled::open(path).map_err(storage)?;
        let epochs    = db.open_tree("epochs").map_err(storage)?;
        let presences = db.open_tree("presences").map_err(storage)?;
        let meta      = db.open_tree("meta").map_err(storage)?;
        let state = Self { db, epochs, presences, meta };
        state.check_schema()?;
        Ok(state)
    }

    /// Ephemeral cache living in the same database file.
    pub fn ephemeral_cache(&self) -> Result<SledCache, PresenceError> {
        SledCache::from_db(&self.db)
    }

    /// Schema version recorded in the database.
    pub fn schema_version(&self) -> Result<Option<u32>, PresenceError> {
        match self.get_meta(SCHEMA_KEY)? {
            Some(bytes) => {
                let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                    PresenceError::Serialization(format!(
                        "schema version is {} bytes, expected 4",
                        bytes.len()
                    ))
                })?;
                Ok(Some(u32::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    fn check_schema(&self) -> Result<(), PresenceError> {
        match self.schema_version()? {
            None => {
                self.put_meta(SCHEMA_KEY, &SCHEMA_VERSION.to_be_bytes())?;
                info!(version = SCHEMA_VERSION, "initialised state database schema");
                Ok(())
            }
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(PresenceError::Storage(format!(
                "database schema version {v} is not supported (expected {SCHEMA_VERSION})"
            ))),
        }
    }

    // ── Epochs ───────────────────────────────────────────────────────────────

    pub fn epoch_exists(&self, id: EpochId) -> bool {
        self.epochs.contains_key(id.to_be_bytes()).unwrap_or(false)
    }

    pub fn epoch_count(&self) -> usize {
        self.epochs.len()
    }

    // ── Meta ─────────────────────────────────────────────────────────────────

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), PresenceError> {
        self.meta.insert(key.as_bytes(), value).map_err(storage)?;
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, PresenceError> {
        self.meta
            .get(key.as_bytes())
            .map(|v| v.map(|iv| iv.to_vec()))
            .map_err(storage)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), PresenceError> {
        self.db.flush().map_err(storage)?;
        Ok(())
    }
}

impl PresenceStore for StateDb {
    fn get_epoch(&self, id: EpochId) -> Result<Option<Epoch>, PresenceError> {
        match self.epochs.get(id.to_be_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(serialization)?)),
            None => Ok(None),
        }
    }

    fn put_epoch(&self, epoch: &Epoch) -> Result<(), PresenceError> {
        let bytes = bincode::serialize(epoch).map_err(serialization)?;
        self.epochs.insert(epoch.id.to_be_bytes(), bytes).map_err(storage)?;
        Ok(())
    }

    fn list_epochs(&self) -> Result<Vec<Epoch>, PresenceError> {
        let mut out = Vec::new();
        for item in self.epochs.iter() {
            let (_, bytes) = item.map_err(storage)?;
            out.push(bincode::deserialize(&bytes).map_err(serialization)?);
        }
        Ok(out)
    }

    fn get_presence(
        &self,
        epoch_id: EpochId,
        actor: &Address,
    ) -> Result<Option<Presence>, PresenceError> {
        match self.presences.get(presence_key(epoch_id, actor)).map_err(storage)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(serialization)?)),
            None => Ok(None),
        }
    }

    fn put_presence(&self, presence: &Presence) -> Result<(), PresenceError> {
        let bytes = bincode::serialize(presence).map_err(serialization)?;
        self.presences
            .insert(presence_key(presence.epoch_id, &presence.actor), bytes)
            .map_err(storage)?;
        Ok(())
    }

    fn list_presences(&self, epoch_id: EpochId) -> Result<Vec<Presence>, PresenceError> {
        let mut out = Vec::new();
        for item in self.presences.scan_prefix(epoch_id.to_be_bytes()) {
            let (_, bytes) = item.map_err(storage)?;
            out.push(bincode::deserialize(&bytes).map_err(serialization)?);
        }
        Ok(out)
    }
}
