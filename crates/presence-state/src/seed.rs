//! Epoch schedules loaded at startup.
//!
//! A schedule is a JSON array of [`EpochSpec`]. Seeding is idempotent:
//! epochs already present in the store are left untouched, so the same file
//! can be passed on every start.

use presence_core::epoch::{Epoch, EpochCapability, Geofence};
use presence_core::error::PresenceError;
use presence_core::types::{Address, EpochId, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::PresenceEngine;

/// One scheduled epoch as written in a schedule file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochSpec {
    pub id: EpochId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    #[serde(default)]
    pub capability: EpochCapability,
    #[serde(default)]
    pub chain_id: u64,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub geofence: Option<Geofence>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl EpochSpec {
    pub fn into_epoch(self) -> Epoch {
        let mut epoch = Epoch::new(self.id, self.start_time, self.end_time, self.capability);
        epoch.chain_id = self.chain_id;
        epoch.contract_address = self.contract_address;
        epoch.geofence = self.geofence;
        epoch.tags = self.tags;
        epoch.description = self.description;
        epoch
    }
}

/// Parse a schedule document.
pub fn parse_schedule(json: &str) -> Result<Vec<EpochSpec>, PresenceError> {
    serde_json::from_str(json).map_err(|e| PresenceError::Serialization(e.to_string()))
}

/// Schedule every epoch in `specs` that the store does not know yet.
///
/// Returns how many were added. Invalid windows abort the whole seed before
/// anything is written.
pub fn seed_epochs(engine: &PresenceEngine, specs: Vec<EpochSpec>) -> Result<usize, PresenceError> {
    if let Some(bad) = specs.iter().find(|s| s.end_time <= s.start_time) {
        return Err(PresenceError::Configuration(format!(
            "epoch {} in schedule ends at {} which is not after its start {}",
            bad.id, bad.end_time, bad.start_time
        )));
    }

    let mut added = 0;
    for spec in specs {
        let id = spec.id;
        match engine.schedule_epoch(spec.into_epoch()) {
            Ok(_) => added += 1,
            Err(PresenceError::EpochAlreadyExists(_)) => {
                debug!(epoch_id = %id, "epoch already scheduled; skipping");
            }
            Err(e) => return Err(e),
        }
    }
    info!(added, "epoch schedule seeded");
    Ok(added)
}
