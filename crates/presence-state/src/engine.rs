use std::sync::Arc;

use presence_core::epoch::{Epoch, EpochState};
use presence_core::error::PresenceError;
use presence_core::event::{PresenceEvent, Topic};
use presence_core::gate::{check_feature, Feature};
use presence_core::presence::{Presence, PresenceState, SlashReason};
use presence_core::types::{Address, Balance, EpochId, Timestamp};
use tracing::{debug, info, warn};

use crate::events::{EventBus, Subscription};
use crate::locks::{KeyLocks, LockKey};
use crate::store::PresenceStore;

/// Which epoch counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochCounter {
    Participants,
    Validated,
}

// ── PresenceEngine ───────────────────────────────────────────────────────────

/// Applies presence mutations to the store.
///
/// Every read-modify-write runs under the lock of the single record it
/// touches, so concurrent callers can never lose an update or declare twice.
/// Events go out after the write is committed and never block it.
pub struct PresenceEngine {
    store: Arc<dyn PresenceStore>,
    locks: KeyLocks,
    bus: Arc<EventBus>,
}

impl PresenceEngine {
    pub fn new(store: Arc<dyn PresenceStore>) -> Self {
        Self::with_bus(store, Arc::new(EventBus::new()))
    }

    pub fn with_bus(store: Arc<dyn PresenceStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            locks: KeyLocks::new(),
            bus,
        }
    }

    pub fn store(&self) -> &Arc<dyn PresenceStore> {
        &self.store
    }

    pub fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.bus.subscribe(topic)
    }

    // ── Epochs ───────────────────────────────────────────────────────────────

    /// Register a new epoch.
    pub fn schedule_epoch(&self, mut epoch: Epoch) -> Result<Epoch, PresenceError> {
        if epoch.end_time <= epoch.start_time {
            return Err(PresenceError::Configuration(format!(
                "epoch {} ends at {} which is not after its start {}",
                epoch.id, epoch.end_time, epoch.start_time
            )));
        }
        epoch.exists = true;
        self.locks.with(LockKey::Epoch(epoch.id), || {
            if self.store.get_epoch(epoch.id)?.is_some() {
                return Err(PresenceError::EpochAlreadyExists(epoch.id));
            }
            self.store.put_epoch(&epoch)?;
            info!(
                epoch_id = %epoch.id,
                start = epoch.start_time,
                end = epoch.end_time,
                capability = %epoch.capability,
                "epoch scheduled"
            );
            Ok::<_, PresenceError>(epoch)
        })
    }

    pub fn epoch(&self, id: EpochId) -> Result<Epoch, PresenceError> {
        self.store
            .get_epoch(id)?
            .ok_or(PresenceError::EpochNotFound(id))
    }

    /// Phase of an epoch at `now`; `EpochState::None` if it does not exist.
    pub fn epoch_state(&self, id: EpochId, now: Timestamp) -> Result<EpochState, PresenceError> {
        Ok(self
            .store
            .get_epoch(id)?
            .map(|e| e.state(now))
            .unwrap_or(EpochState::None))
    }

    pub fn increment_epoch_counter(
        &self,
        id: EpochId,
        counter: EpochCounter,
    ) -> Result<(), PresenceError> {
        self.locks.with(LockKey::Epoch(id), || {
            let mut epoch = self.epoch(id)?;
            match counter {
                EpochCounter::Participants => {
                    epoch.participant_count = epoch.participant_count.saturating_add(1)
                }
                EpochCounter::Validated => {
                    epoch.validated_count = epoch.validated_count.saturating_add(1)
                }
            }
            self.store.put_epoch(&epoch)
        })
    }

    /// Apply the external finalization signal to a closed epoch.
    ///
    /// Validated presences become finalized; declared and slashed ones stay
    /// as they are. Finalizing an already finalized epoch is a no-op.
    pub fn finalize_epoch(&self, id: EpochId, now: Timestamp) -> Result<Epoch, PresenceError> {
        let (epoch, newly_finalized) = self.locks.with(LockKey::Epoch(id), || {
            let mut epoch = self.epoch(id)?;
            match epoch.state(now) {
                EpochState::Finalized => return Ok((epoch, false)),
                EpochState::Closed => {}
                state => return Err(PresenceError::EpochNotClosed { epoch_id: id, state }),
            }
            epoch.finalized = true;
            self.store.put_epoch(&epoch)?;
            Ok::<_, PresenceError>((epoch, true))
        })?;

        if !newly_finalized {
            debug!(epoch_id = %id, "epoch already finalized");
            return Ok(epoch);
        }

        let mut finalized = 0u32;
        for presence in self.store.list_presences(id)? {
            if self.finalize_presence(id, presence.actor, now)? {
                finalized += 1;
            }
        }
        info!(epoch_id = %id, presences = finalized, "epoch finalized");
        Ok(epoch)
    }

    fn finalize_presence(
        &self,
        epoch_id: EpochId,
        actor: Address,
        now: Timestamp,
    ) -> Result<bool, PresenceError> {
        let changed = self.locks.with(LockKey::Presence(epoch_id, actor), || {
            let Some(mut presence) = self.store.get_presence(epoch_id, &actor)? else {
                return Ok(false);
            };
            if !presence.state.can_transition_to(PresenceState::Finalized) {
                return Ok(false);
            }
            presence.state = PresenceState::Finalized;
            presence.finalized_at = Some(now);
            self.store.put_presence(&presence)?;
            Ok::<_, PresenceError>(true)
        })?;
        if changed {
            self.bus.emit(PresenceEvent::Finalized { epoch_id, actor, at: now });
        }
        Ok(changed)
    }

    // ── Presences ────────────────────────────────────────────────────────────

    /// Current presence of `actor`, or the implicit `none` record.
    pub fn presence(&self, epoch_id: EpochId, actor: &Address) -> Result<Presence, PresenceError> {
        Ok(self
            .store
            .get_presence(epoch_id, actor)?
            .unwrap_or_else(|| Presence::new(epoch_id, *actor)))
    }

    /// Declare `actor` present in an active epoch.
    pub fn declare_presence(
        &self,
        epoch_id: EpochId,
        actor: Address,
        stake: Option<Balance>,
        now: Timestamp,
    ) -> Result<Presence, PresenceError> {
        let state = self.epoch_state(epoch_id, now)?;
        if !state.allows_declarations() {
            return Err(PresenceError::EpochNotActive { epoch_id, state });
        }

        let presence = self.locks.with(LockKey::Presence(epoch_id, actor), || {
            if let Some(existing) = self.store.get_presence(epoch_id, &actor)? {
                if existing.state != PresenceState::None {
                    return Err(PresenceError::AlreadyDeclared {
                        epoch_id,
                        actor,
                        state: existing.state,
                    });
                }
            }
            let presence = Presence::declared(epoch_id, actor, stake, now);
            self.store.put_presence(&presence)?;
            Ok::<_, PresenceError>(presence)
        })?;

        self.increment_epoch_counter(epoch_id, EpochCounter::Participants)?;
        self.bus.emit(PresenceEvent::Declared { epoch_id, actor, at: now });
        info!(epoch_id = %epoch_id, actor = %actor, "presence declared");
        Ok(presence)
    }

    /// Record that `actor` left the epoch; starts the echo fade.
    ///
    /// Leaving twice keeps the first departure time.
    pub fn leave_epoch(
        &self,
        epoch_id: EpochId,
        actor: Address,
        now: Timestamp,
    ) -> Result<Presence, PresenceError> {
        let (presence, changed) = self.locks.with(LockKey::Presence(epoch_id, actor), || {
            let mut presence = self
                .store
                .get_presence(epoch_id, &actor)?
                .ok_or(PresenceError::PresenceNotFound { epoch_id, actor })?;
            if !presence.can_interact() {
                return Err(PresenceError::PresenceNotInteractive { state: presence.state });
            }
            if presence.left_at.is_some() {
                return Ok((presence, false));
            }
            presence.left_at = Some(now);
            self.store.put_presence(&presence)?;
            Ok::<_, PresenceError>((presence, true))
        })?;

        if changed {
            self.bus.emit(PresenceEvent::Left { epoch_id, actor, at: now });
            debug!(epoch_id = %epoch_id, actor = %actor, "presence left");
        }
        Ok(presence)
    }

    /// Slash a declared or validated presence for a policy violation.
    pub fn slash(
        &self,
        epoch_id: EpochId,
        actor: Address,
        reason: SlashReason,
        now: Timestamp,
    ) -> Result<Presence, PresenceError> {
        let presence = self.locks.with(LockKey::Presence(epoch_id, actor), || {
            let mut presence = self
                .store
                .get_presence(epoch_id, &actor)?
                .ok_or(PresenceError::PresenceNotFound { epoch_id, actor })?;
            presence.state.ensure_transition(PresenceState::Slashed)?;
            presence.state = PresenceState::Slashed;
            presence.slash_reason = Some(reason.clone());
            self.store.put_presence(&presence)?;
            Ok::<_, PresenceError>(presence)
        })?;

        warn!(epoch_id = %epoch_id, actor = %actor, reason = %reason, "presence slashed");
        self.bus.emit(PresenceEvent::Slashed { epoch_id, actor, reason, at: now });
        Ok(presence)
    }

    // ── Capability gating ────────────────────────────────────────────────────

    /// Check whether `actor` may use `feature` in `epoch_id` right now.
    ///
    /// Reports the first failing gate: phase, then capability, then the
    /// actor's own presence state.
    pub fn authorize(
        &self,
        epoch_id: EpochId,
        actor: &Address,
        feature: Feature,
        now: Timestamp,
    ) -> Result<(), PresenceError> {
        let epoch = self.store.get_epoch(epoch_id)?;
        let state = self
            .store
            .get_presence(epoch_id, actor)?
            .map(|p| p.state)
            .unwrap_or_default();
        check_feature(epoch.as_ref(), state, feature, now)
            .map_err(|e| e.into_presence_error(epoch_id))
    }
}
