use presence_core::echo::{collect_echoes, Echo};
use presence_core::epoch::{Epoch, EpochState};
use presence_core::error::PresenceError;
use presence_core::presence::{Presence, PresenceState};
use presence_core::types::{Address, EpochId, Timestamp};
use presence_state::PresenceStore;

/// Query helpers for epochs and the presences inside them.
pub struct EpochQuery<'a> {
    store: &'a dyn PresenceStore,
}

impl<'a> EpochQuery<'a> {
    pub fn new(store: &'a dyn PresenceStore) -> Self {
        Self { store }
    }

    pub fn epoch(&self, epoch_id: EpochId) -> Result<Option<Epoch>, PresenceError> {
        self.store.get_epoch(epoch_id)
    }

    /// Presence of `actor` in `epoch_id`.
    ///
    /// `None` if the epoch does not exist. An actor who never declared gets
    /// the implicit `none` record; it is not written back.
    pub fn fetch_presence(
        &self,
        actor: &Address,
        epoch_id: EpochId,
    ) -> Result<Option<Presence>, PresenceError> {
        if self.store.get_epoch(epoch_id)?.is_none() {
            return Ok(None);
        }
        Ok(Some(
            self.store
                .get_presence(epoch_id, actor)?
                .unwrap_or_else(|| Presence::new(epoch_id, *actor)),
        ))
    }

    /// Every actor who declared in `epoch_id`, in declaration order.
    pub fn fetch_participants(&self, epoch_id: EpochId) -> Result<Vec<Presence>, PresenceError> {
        self.require_epoch(epoch_id)?;
        let mut participants: Vec<Presence> = self
            .store
            .list_presences(epoch_id)?
            .into_iter()
            .filter(|p| p.state != PresenceState::None)
            .collect();
        participants.sort_by(|a, b| {
            a.declared_at
                .cmp(&b.declared_at)
                .then_with(|| a.actor.cmp(&b.actor))
        });
        Ok(participants)
    }

    /// Participants another actor could discover right now: the epoch must
    /// allow discovery and the presence must be interactive and not departed.
    pub fn fetch_discoverable(
        &self,
        epoch_id: EpochId,
        now: Timestamp,
    ) -> Result<Vec<Presence>, PresenceError> {
        let epoch = self.require_epoch(epoch_id)?;
        if !epoch.supports_discovery(now) {
            return Ok(Vec::new());
        }
        Ok(self
            .fetch_participants(epoch_id)?
            .into_iter()
            .filter(|p| p.is_discoverable() && !p.has_left())
            .collect())
    }

    /// Recently departed presences, fading over the echo window, newest first.
    pub fn fetch_echoes(&self, epoch_id: EpochId, now: Timestamp) -> Result<Vec<Echo>, PresenceError> {
        self.require_epoch(epoch_id)?;
        Ok(collect_echoes(self.store.list_presences(epoch_id)?, now))
    }

    /// Epochs in the given phase at `now`, by id.
    pub fn epochs_in_state(
        &self,
        state: EpochState,
        now: Timestamp,
    ) -> Result<Vec<Epoch>, PresenceError> {
        let mut epochs: Vec<Epoch> = self
            .store
            .list_epochs()?
            .into_iter()
            .filter(|e| e.state(now) == state)
            .collect();
        epochs.sort_by_key(|e| e.id);
        Ok(epochs)
    }

    pub fn epochs_tagged(&self, tag: &str) -> Result<Vec<Epoch>, PresenceError> {
        let mut epochs: Vec<Epoch> = self
            .store
            .list_epochs()?
            .into_iter()
            .filter(|e| e.has_tag(tag))
            .collect();
        epochs.sort_by_key(|e| e.id);
        Ok(epochs)
    }

    /// Human-readable summary of an epoch's phase and counters.
    pub fn describe(&self, epoch_id: EpochId, now: Timestamp) -> Result<String, PresenceError> {
        let e = self.require_epoch(epoch_id)?;

        let phase = match e.state(now) {
            EpochState::None => "Unknown".to_string(),
            EpochState::Scheduled => {
                format!("Scheduled, starts in {}", format_secs(e.start_time.saturating_sub(now)))
            }
            EpochState::Active => format!(
                "Active, {} left ({:.0}% elapsed)",
                format_secs(e.time_remaining(now)),
                e.progress(now) * 100.0
            ),
            EpochState::Closed => format!("Closed at {}, awaiting finalization", e.end_time),
            EpochState::Finalized => "Finalized".to_string(),
        };

        let mut line = format!(
            "Epoch {} | {} | {} participants, {} validated | {}",
            e.id, e.capability, e.participant_count, e.validated_count, phase
        );
        if let Some(desc) = &e.description {
            line.push_str(" | ");
            line.push_str(desc);
        }
        Ok(line)
    }

    fn require_epoch(&self, epoch_id: EpochId) -> Result<Epoch, PresenceError> {
        self.store
            .get_epoch(epoch_id)?
            .ok_or(PresenceError::EpochNotFound(epoch_id))
    }
}

/// `3d 4h`, `2h 5m`, `45s` style durations.
fn format_secs(secs: i64) -> String {
    let secs = secs.max(0);
    let (d, h, m, s) = (secs / 86_400, secs % 86_400 / 3600, secs % 3600 / 60, secs % 60);
    if d > 0 {
        format!("{d}d {h}h")
    } else if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::epoch::EpochCapability;
    use presence_core::presence::SlashReason;
    use presence_state::{MemoryStore, PresenceEngine};
    use std::sync::Arc;

    const T0: Timestamp = 1_900_000_000;
    const HOUR: i64 = 3600;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn engine_with_epoch() -> (PresenceEngine, EpochId) {
        let engine = PresenceEngine::new(Arc::new(MemoryStore::new()));
        let mut epoch = Epoch::new(EpochId::new(9), T0, T0 + 48 * HOUR, EpochCapability::PresenceWithSignals);
        epoch.description = Some("rooftop".into());
        epoch.tags = vec!["Music".into()];
        let id = engine.schedule_epoch(epoch).unwrap().id;
        (engine, id)
    }

    #[test]
    fn fetch_presence_defaults_to_none() {
        let (engine, id) = engine_with_epoch();
        let q = EpochQuery::new(engine.store().as_ref());
        let p = q.fetch_presence(&addr(1), id).unwrap().unwrap();
        assert_eq!(p.state, PresenceState::None);
        assert!(q.fetch_presence(&addr(1), EpochId::new(404)).unwrap().is_none());
        // The implicit record is not persisted.
        assert!(q.fetch_participants(id).unwrap().is_empty());
    }

    #[test]
    fn participants_in_declaration_order() {
        let (engine, id) = engine_with_epoch();
        engine.declare_presence(id, addr(3), None, T0 + 10).unwrap();
        engine.declare_presence(id, addr(1), None, T0 + 20).unwrap();
        engine.declare_presence(id, addr(2), None, T0 + 30).unwrap();
        engine.slash(id, addr(2), SlashReason::DoubleDeclaration, T0 + 31).unwrap();
        engine.leave_epoch(id, addr(3), T0 + 40).unwrap();

        let q = EpochQuery::new(engine.store().as_ref());
        let actors: Vec<_> = q.fetch_participants(id).unwrap().iter().map(|p| p.actor).collect();
        assert_eq!(actors, vec![addr(3), addr(1), addr(2)]);

        let visible: Vec<_> = q
            .fetch_discoverable(id, T0 + 50)
            .unwrap()
            .iter()
            .map(|p| p.actor)
            .collect();
        assert_eq!(visible, vec![addr(1)]);
        assert!(q.fetch_discoverable(id, T0 + 48 * HOUR).unwrap().is_empty());
        assert!(matches!(
            q.fetch_participants(EpochId::new(404)),
            Err(PresenceError::EpochNotFound(_))
        ));
    }

    #[test]
    fn echoes_fade_and_sort() {
        let (engine, id) = engine_with_epoch();
        for b in 1..=3u8 {
            engine.declare_presence(id, addr(b), None, T0).unwrap();
        }
        engine.leave_epoch(id, addr(1), T0 + HOUR).unwrap();
        engine.leave_epoch(id, addr(2), T0 + 10 * HOUR).unwrap();

        let q = EpochQuery::new(engine.store().as_ref());
        let echoes = q.fetch_echoes(id, T0 + 12 * HOUR).unwrap();
        assert_eq!(echoes.len(), 2);
        assert_eq!(echoes[0].presence.actor, addr(2));
        assert!(echoes[0].opacity > echoes[1].opacity);

        // 24h after the first departure it is gone; the second still shows.
        let later = q.fetch_echoes(id, T0 + 25 * HOUR).unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].presence.actor, addr(2));
    }

    #[test]
    fn describe_reports_phase() {
        let (engine, id) = engine_with_epoch();
        engine.declare_presence(id, addr(1), None, T0).unwrap();
        let q = EpochQuery::new(engine.store().as_ref());

        let before = q.describe(id, T0 - 90).unwrap();
        assert!(before.contains("Scheduled, starts in 1m 30s"), "{before}");

        let during = q.describe(id, T0 + 24 * HOUR).unwrap();
        assert!(during.starts_with("Epoch 9 |"), "{during}");
        assert!(during.contains("1 participants, 0 validated"), "{during}");
        assert!(during.contains("Active, 1d 0h left (50% elapsed)"), "{during}");
        assert!(during.ends_with("| rooftop"), "{during}");

        let after = q.describe(id, T0 + 48 * HOUR).unwrap();
        assert!(after.contains("awaiting finalization"), "{after}");
    }

    #[test]
    fn describe_survives_extreme_windows() {
        let engine = PresenceEngine::new(Arc::new(MemoryStore::new()));
        let wide = EpochId::new(1);
        let late = EpochId::new(2);
        engine
            .schedule_epoch(Epoch::new(wide, -9_223_372_036_854_775_000, 9_223_372_036_854_775_000, EpochCapability::PresenceOnly))
            .unwrap();
        engine
            .schedule_epoch(Epoch::new(late, i64::MAX - 1, i64::MAX, EpochCapability::PresenceOnly))
            .unwrap();
        let q = EpochQuery::new(engine.store().as_ref());

        let line = q.describe(wide, T0).unwrap();
        assert!(line.contains("Active"), "{line}");
        let line = q.describe(late, i64::MIN).unwrap();
        assert!(line.contains("Scheduled, starts in"), "{line}");
    }

    #[test]
    fn epoch_listings() {
        let (engine, id) = engine_with_epoch();
        engine
            .schedule_epoch(Epoch::new(EpochId::new(2), T0 + 100 * HOUR, T0 + 101 * HOUR, EpochCapability::PresenceOnly))
            .unwrap();
        let q = EpochQuery::new(engine.store().as_ref());
        let active: Vec<_> = q.epochs_in_state(EpochState::Active, T0).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(active, vec![id]);
        assert_eq!(q.epochs_in_state(EpochState::Scheduled, T0).unwrap().len(), 1);
        assert_eq!(q.epochs_tagged("music").unwrap().len(), 1);
        assert!(q.epochs_tagged("sports").unwrap().is_empty());
    }
}
