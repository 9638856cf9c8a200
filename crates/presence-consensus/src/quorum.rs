use std::sync::Arc;

use presence_core::constants::DEFAULT_QUORUM_SIZE;
use presence_core::epoch::EpochState;
use presence_core::error::PresenceError;
use presence_core::event::PresenceEvent;
use presence_core::presence::PresenceState;
use presence_core::types::{Address, EpochId, Timestamp};
use presence_state::{EpochCounter, LockKey, PresenceEngine};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Process-wide validation quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumConfig {
    /// Votes needed to promote a declared presence to validated. Must be > 0.
    pub quorum_size: u32,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            quorum_size: DEFAULT_QUORUM_SIZE,
        }
    }
}

impl QuorumConfig {
    pub fn new(quorum_size: u32) -> Result<Self, PresenceError> {
        let config = Self { quorum_size };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PresenceError> {
        if self.quorum_size == 0 {
            return Err(PresenceError::Configuration(
                "quorum size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn is_met(&self, votes: u32) -> bool {
        votes >= self.quorum_size
    }
}

/// Result of one validation vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote counted; quorum not reached yet.
    Counted { validation_count: u32, votes_needed: u32 },
    /// This vote reached quorum and promoted the presence.
    Validated { validation_count: u32 },
    /// The presence was not in `declared`; the vote was discarded.
    Ignored { state: PresenceState },
    /// The epoch no longer accepts votes; the vote was discarded.
    EpochClosed { state: EpochState },
}

/// Counts validation votes and promotes declared presences at quorum.
///
/// Votes on the same `(epoch, actor)` are applied one at a time, so exactly
/// one vote observes the declared → validated step and the `validated`
/// event fires once no matter how votes interleave.
pub struct QuorumValidator {
    engine: Arc<PresenceEngine>,
    config: QuorumConfig,
}

impl QuorumValidator {
    pub fn new(engine: Arc<PresenceEngine>, config: QuorumConfig) -> Result<Self, PresenceError> {
        config.validate()?;
        Ok(Self { engine, config })
    }

    pub fn quorum_size(&self) -> u32 {
        self.config.quorum_size
    }

    pub fn config(&self) -> QuorumConfig {
        self.config
    }

    /// Record one validation vote for `actor` in `epoch_id`.
    ///
    /// Votes for presences that are not `declared` (including ones that
    /// were just validated) are discarded without error, as are votes
    /// arriving while the epoch is not active.
    pub fn submit_validation_vote(
        &self,
        epoch_id: EpochId,
        actor: Address,
        now: Timestamp,
    ) -> Result<VoteOutcome, PresenceError> {
        let store = self.engine.store();
        let outcome = self.engine.locks().with(LockKey::Presence(epoch_id, actor), || {
            // Read under the presence lock so a finalization that ran while
            // this vote waited is observed.
            let epoch_state = self.engine.epoch_state(epoch_id, now)?;
            if epoch_state != EpochState::Active {
                return Ok(VoteOutcome::EpochClosed { state: epoch_state });
            }
            let Some(mut presence) = store.get_presence(epoch_id, &actor)? else {
                return Ok(VoteOutcome::Ignored { state: PresenceState::None });
            };
            if presence.state != PresenceState::Declared {
                return Ok(VoteOutcome::Ignored { state: presence.state });
            }

            presence.validation_count = presence.validation_count.saturating_add(1);
            let count = presence.validation_count;
            let outcome = if self.config.is_met(count) {
                presence.state.ensure_transition(PresenceState::Validated)?;
                presence.state = PresenceState::Validated;
                presence.validated_at = Some(now);
                VoteOutcome::Validated { validation_count: count }
            } else {
                VoteOutcome::Counted {
                    validation_count: count,
                    votes_needed: presence.votes_needed(self.config.quorum_size),
                }
            };
            store.put_presence(&presence)?;
            Ok::<_, PresenceError>(outcome)
        })?;

        match outcome {
            VoteOutcome::Validated { validation_count } => {
                self.engine
                    .increment_epoch_counter(epoch_id, EpochCounter::Validated)?;
                self.engine.bus().emit(PresenceEvent::Validated {
                    epoch_id,
                    actor,
                    validation_count,
                    at: now,
                });
                info!(epoch_id = %epoch_id, actor = %actor, votes = validation_count, "presence validated");
            }
            VoteOutcome::Counted { validation_count, votes_needed } => {
                debug!(epoch_id = %epoch_id, actor = %actor, votes = validation_count, votes_needed, "validation vote counted");
            }
            VoteOutcome::Ignored { state } => {
                debug!(epoch_id = %epoch_id, actor = %actor, state = %state, "vote for non-declared presence discarded");
            }
            VoteOutcome::EpochClosed { state } => {
                debug!(epoch_id = %epoch_id, actor = %actor, state = %state, "vote outside active epoch discarded");
            }
        }
        Ok(outcome)
    }

    /// Fraction of the quorum reached by `actor`.
    pub fn validation_progress(
        &self,
        epoch_id: EpochId,
        actor: &Address,
    ) -> Result<f64, PresenceError> {
        Ok(self
            .engine
            .presence(epoch_id, actor)?
            .validation_progress(self.config.quorum_size))
    }

    pub fn votes_needed(&self, epoch_id: EpochId, actor: &Address) -> Result<u32, PresenceError> {
        Ok(self
            .engine
            .presence(epoch_id, actor)?
            .votes_needed(self.config.quorum_size))
    }
}
