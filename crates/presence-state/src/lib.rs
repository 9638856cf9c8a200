//! presence-state
//!
//! Durable epoch and presence records, the per-key lock table that
//! serializes mutations, the event bus, and the `PresenceEngine` that
//! applies declarations, departures, slashes and epoch finalization.
//! `EpochGatedCache` keeps ephemeral data unreachable once its epoch closes.
//! `seed` loads an epoch schedule into a fresh store.

pub mod db;
pub mod engine;
pub mod events;
pub mod gated_cache;
pub mod locks;
pub mod seed;
pub mod store;

pub use db::StateDb;
pub use engine::{EpochCounter, PresenceEngine};
pub use events::{EventBus, Subscription};
pub use gated_cache::EpochGatedCache;
pub use locks::{KeyLocks, LockKey};
pub use seed::{parse_schedule, seed_epochs, EpochSpec};
pub use store::{MemoryStore, PresenceStore};
