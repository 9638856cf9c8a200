use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use presence_cache::EphemeralCache;
use presence_core::constants::DEFAULT_TICK_INTERVAL_SECS;
use presence_core::epoch::EpochState;
use presence_core::error::PresenceError;
use presence_core::event::PresenceEvent;
use presence_core::types::{EpochId, Timestamp};
use presence_state::PresenceEngine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tick_interval_secs: u64,
    /// Emit a `timer_tick` for every active epoch on each tick.
    pub emit_timer_ticks: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            emit_timer_ticks: true,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), PresenceError> {
        if self.tick_interval_secs == 0 {
            return Err(PresenceError::Configuration(
                "tick interval must be at least one second".into(),
            ));
        }
        Ok(())
    }
}

/// What one tick observed and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub transitions: Vec<(EpochId, EpochState, EpochState)>,
    pub timer_ticks: usize,
    /// `(epoch, keys removed)` for every epoch purged on this tick.
    pub purged: Vec<(EpochId, usize)>,
}

/// Clock-driven observer of epoch phases.
///
/// Phases are never stored; each tick recomputes them from the epoch records
/// and the clock. The monitor remembers the last phase it saw per epoch and
/// is the only emitter of `phase_changed` and `timer_tick`. An epoch seen for
/// the first time is recorded silently. Cached data of closed and finalized
/// epochs is purged on every tick that finds some.
pub struct PhaseMonitor {
    engine: Arc<PresenceEngine>,
    cache: Arc<dyn EphemeralCache>,
    config: MonitorConfig,
    observed: Mutex<HashMap<EpochId, EpochState>>,
}

impl PhaseMonitor {
    pub fn new(
        engine: Arc<PresenceEngine>,
        cache: Arc<dyn EphemeralCache>,
        config: MonitorConfig,
    ) -> Result<Self, PresenceError> {
        config.validate()?;
        Ok(Self {
            engine,
            cache,
            config,
            observed: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> MonitorConfig {
        self.config
    }

    /// Last phase seen for `epoch_id`, if it has been observed.
    pub fn observed(&self, epoch_id: EpochId) -> Option<EpochState> {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&epoch_id)
            .copied()
    }

    pub fn tick(&self, now: Timestamp) -> Result<TickReport, PresenceError> {
        let epochs = self.engine.store().list_epochs()?;
        let cached: BTreeSet<EpochId> = self.cache.cached_epoch_ids().into_iter().collect();

        let mut report = TickReport::default();
        let mut changes = Vec::new();
        {
            let mut seen = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
            for epoch in &epochs {
                let state = epoch.state(now);
                match seen.insert(epoch.id, state) {
                    Some(prev) if prev != state => changes.push((epoch.id, prev, state)),
                    _ => {}
                }
            }
        }

        let bus = self.engine.bus();
        for (epoch_id, from, to) in changes {
            info!(epoch_id = %epoch_id, from = %from, to = %to, "epoch phase changed");
            bus.emit(PresenceEvent::PhaseChanged { epoch_id, from, to, at: now });
            report.transitions.push((epoch_id, from, to));
        }

        for epoch in &epochs {
            let state = epoch.state(now);
            if state == EpochState::Active && self.config.emit_timer_ticks {
                bus.emit(PresenceEvent::TimerTick {
                    epoch_id: epoch.id,
                    remaining_secs: epoch.time_remaining(now),
                    at: now,
                });
                report.timer_ticks += 1;
            }
            if state.is_past_active() && cached.contains(&epoch.id) {
                let removed = self.cache.purge_epoch(epoch.id);
                info!(epoch_id = %epoch.id, removed, "purged ephemeral data of closed epoch");
                report.purged.push((epoch.id, removed));
            }
        }

        debug!(
            epochs = epochs.len(),
            transitions = report.transitions.len(),
            purged = report.purged.len(),
            "phase monitor tick"
        );
        Ok(report)
    }
}
