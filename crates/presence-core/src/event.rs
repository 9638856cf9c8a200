use serde::{Deserialize, Serialize};

use crate::epoch::EpochState;
use crate::presence::SlashReason;
use crate::types::{Address, EpochId, Timestamp};

/// Events emitted by the presence engine and the phase monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceEvent {
    Declared {
        epoch_id: EpochId,
        actor: Address,
        at: Timestamp,
    },
    Validated {
        epoch_id: EpochId,
        actor: Address,
        validation_count: u32,
        at: Timestamp,
    },
    Slashed {
        epoch_id: EpochId,
        actor: Address,
        reason: SlashReason,
        at: Timestamp,
    },
    Finalized {
        epoch_id: EpochId,
        actor: Address,
        at: Timestamp,
    },
    Left {
        epoch_id: EpochId,
        actor: Address,
        at: Timestamp,
    },
    PhaseChanged {
        epoch_id: EpochId,
        from: EpochState,
        to: EpochState,
        at: Timestamp,
    },
    TimerTick {
        epoch_id: EpochId,
        remaining_secs: i64,
        at: Timestamp,
    },
}

impl PresenceEvent {
    pub fn epoch_id(&self) -> EpochId {
        match self {
            PresenceEvent::Declared { epoch_id, .. }
            | PresenceEvent::Validated { epoch_id, .. }
            | PresenceEvent::Slashed { epoch_id, .. }
            | PresenceEvent::Finalized { epoch_id, .. }
            | PresenceEvent::Left { epoch_id, .. }
            | PresenceEvent::PhaseChanged { epoch_id, .. }
            | PresenceEvent::TimerTick { epoch_id, .. } => *epoch_id,
        }
    }

    /// The actor the event concerns; `None` for epoch-wide events.
    pub fn actor(&self) -> Option<Address> {
        match self {
            PresenceEvent::Declared { actor, .. }
            | PresenceEvent::Validated { actor, .. }
            | PresenceEvent::Slashed { actor, .. }
            | PresenceEvent::Finalized { actor, .. }
            | PresenceEvent::Left { actor, .. } => Some(*actor),
            PresenceEvent::PhaseChanged { .. } | PresenceEvent::TimerTick { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PresenceEvent::Declared { .. } => "declared",
            PresenceEvent::Validated { .. } => "validated",
            PresenceEvent::Slashed { .. } => "slashed",
            PresenceEvent::Finalized { .. } => "finalized",
            PresenceEvent::Left { .. } => "left",
            PresenceEvent::PhaseChanged { .. } => "phase_changed",
            PresenceEvent::TimerTick { .. } => "timer_tick",
        }
    }
}

/// Subscription filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every event of an epoch, including phase changes and ticks.
    Epoch(EpochId),
    /// Events about one actor in one epoch, plus that epoch's phase events.
    Presence(EpochId, Address),
}

impl Topic {
    pub fn matches(&self, event: &PresenceEvent) -> bool {
        match self {
            Topic::Epoch(id) => event.epoch_id() == *id,
            Topic::Presence(id, actor) => {
                event.epoch_id() == *id && event.actor().map_or(true, |a| a == *actor)
            }
        }
    }
}
