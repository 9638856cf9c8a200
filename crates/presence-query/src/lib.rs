//! presence-query
//!
//! Read-side views over epochs and presences: single lookups, participant
//! and echo listings, status lines and phase timelines. Mutations live in
//! presence-state's `PresenceEngine` and presence-consensus.

pub mod query;
pub mod timeline;

pub use query::EpochQuery;
pub use timeline::{phase_timeline, PhaseMark};
