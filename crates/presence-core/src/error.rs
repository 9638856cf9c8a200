use thiserror::Error;

use crate::epoch::{EpochCapability, EpochState};
use crate::gate::Feature;
use crate::presence::PresenceState;
use crate::types::{Address, EpochId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PresenceError {
    // ── State machine errors ─────────────────────────────────────────────────
    #[error("invalid presence transition: {from} -> {to}")]
    InvalidTransition { from: PresenceState, to: PresenceState },

    #[error("epoch {epoch_id} is not active (currently {state})")]
    EpochNotActive { epoch_id: EpochId, state: EpochState },

    #[error("epoch {epoch_id} cannot be finalized while {state}")]
    EpochNotClosed { epoch_id: EpochId, state: EpochState },

    #[error("{actor} already declared presence in epoch {epoch_id} (state {state})")]
    AlreadyDeclared {
        epoch_id: EpochId,
        actor: Address,
        state: PresenceState,
    },

    #[error("epoch already exists: {0}")]
    EpochAlreadyExists(EpochId),

    // ── Capability gating ────────────────────────────────────────────────────
    #[error("epoch capability {capability} does not support {feature}")]
    CapabilityNotSupported {
        capability: EpochCapability,
        feature: Feature,
    },

    #[error("presence in state {state} cannot interact")]
    PresenceNotInteractive { state: PresenceState },

    // ── Lookups ──────────────────────────────────────────────────────────────
    #[error("epoch not found: {0}")]
    EpochNotFound(EpochId),

    #[error("no presence for {actor} in epoch {epoch_id}")]
    PresenceNotFound { epoch_id: EpochId, actor: Address },

    // ── Configuration ────────────────────────────────────────────────────────
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Why a feature-gated operation was refused.
///
/// Gates are checked in order (phase, capability, own presence state) and the
/// first failure is reported, so clients can tell "epoch hasn't started"
/// apart from "declare presence first".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("epoch is not active (currently {state})")]
    EpochNotActive { state: EpochState },

    #[error("epoch capability {capability} does not support {feature}")]
    CapabilityNotSupported {
        capability: EpochCapability,
        feature: Feature,
    },

    #[error("presence in state {state} cannot interact")]
    PresenceNotInteractive { state: PresenceState },
}

impl GateError {
    /// Short machine-readable name of the failing gate.
    pub fn reason(&self) -> &'static str {
        match self {
            GateError::EpochNotActive { .. } => "epoch_not_active",
            GateError::CapabilityNotSupported { .. } => "capability_not_supported",
            GateError::PresenceNotInteractive { .. } => "presence_not_interactive",
        }
    }

    /// Lift into the crate-wide error, attaching the epoch being gated.
    pub fn into_presence_error(self, epoch_id: EpochId) -> PresenceError {
        match self {
            GateError::EpochNotActive { state } => PresenceError::EpochNotActive { epoch_id, state },
            GateError::CapabilityNotSupported { capability, feature } => {
                PresenceError::CapabilityNotSupported { capability, feature }
            }
            GateError::PresenceNotInteractive { state } => {
                PresenceError::PresenceNotInteractive { state }
            }
        }
    }
}
