use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{ECHO_WINDOW_HOURS, ECHO_WINDOW_SECS};
use crate::echo::echo_opacity;
use crate::epoch::Epoch;
use crate::error::PresenceError;
use crate::gate::{check_feature, Feature};
use crate::types::{Address, Balance, EpochId, Timestamp};

// ── PresenceState ────────────────────────────────────────────────────────────

/// Lifecycle of one actor's participation in one epoch.
///
/// `None < Declared < Validated < Finalized` is the forward path; `Slashed`
/// is a disjoint terminal state reachable from declared or validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PresenceState {
    #[default]
    None = 0,
    Declared = 1,
    Validated = 2,
    Finalized = 3,
    Slashed = 4,
}

impl PresenceState {
    pub const ALL: [PresenceState; 5] = [
        PresenceState::None,
        PresenceState::Declared,
        PresenceState::Validated,
        PresenceState::Finalized,
        PresenceState::Slashed,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// States this one may legally move to. Empty for terminal states.
    pub fn valid_next_states(self) -> &'static [PresenceState] {
        match self {
            PresenceState::None => &[PresenceState::Declared],
            PresenceState::Declared => &[PresenceState::Validated, PresenceState::Slashed],
            PresenceState::Validated => &[PresenceState::Finalized, PresenceState::Slashed],
            PresenceState::Finalized | PresenceState::Slashed => &[],
        }
    }

    pub fn can_transition_to(self, to: PresenceState) -> bool {
        self.valid_next_states().contains(&to)
    }

    /// Check a transition, returning `InvalidTransition` if it is not legal.
    pub fn ensure_transition(self, to: PresenceState) -> Result<(), PresenceError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(PresenceError::InvalidTransition { from: self, to })
        }
    }

    pub fn can_interact(self) -> bool {
        matches!(
            self,
            PresenceState::Declared | PresenceState::Validated | PresenceState::Finalized
        )
    }

    /// Discoverability always agrees with `can_interact`.
    pub fn is_discoverable(self) -> bool {
        self.can_interact()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PresenceState::Finalized | PresenceState::Slashed)
    }

    pub fn requires_validation(self) -> bool {
        matches!(self, PresenceState::Declared)
    }

    /// True for `Validated` and `Finalized`; `Slashed` is off the forward path.
    pub fn is_validated_or_above(self) -> bool {
        matches!(self, PresenceState::Validated | PresenceState::Finalized)
    }
}

/// Free function form of [`PresenceState::can_transition_to`].
pub fn can_transition_presence(from: PresenceState, to: PresenceState) -> bool {
    from.can_transition_to(to)
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PresenceState::None => "none",
            PresenceState::Declared => "declared",
            PresenceState::Validated => "validated",
            PresenceState::Finalized => "finalized",
            PresenceState::Slashed => "slashed",
        };
        f.write_str(s)
    }
}

// ── Slash reason ─────────────────────────────────────────────────────────────

/// Why a presence was slashed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlashReason {
    /// The actor tried to hold two presences at once.
    DoubleDeclaration,
    /// Validators found the attested presence to be false.
    FalseValidation,
    /// Generic protocol policy violation.
    PolicyViolation,
    Other(String),
}

impl fmt::Display for SlashReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlashReason::DoubleDeclaration => f.write_str("double declaration"),
            SlashReason::FalseValidation => f.write_str("false validation"),
            SlashReason::PolicyViolation => f.write_str("policy violation"),
            SlashReason::Other(s) => f.write_str(s),
        }
    }
}

// ── Presence ─────────────────────────────────────────────────────────────────

/// One actor's participation record in one epoch, keyed by `(epoch_id, actor)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub epoch_id: EpochId,
    pub actor: Address,
    pub state: PresenceState,
    pub declared_at: Option<Timestamp>,
    pub validated_at: Option<Timestamp>,
    pub finalized_at: Option<Timestamp>,
    /// Set when the actor leaves the epoch; drives echo decay.
    pub left_at: Option<Timestamp>,
    pub validation_count: u32,
    pub stake: Option<Balance>,
    pub slash_reason: Option<SlashReason>,
}

impl Presence {
    /// The implicit record for an actor that has never declared.
    pub fn new(epoch_id: EpochId, actor: Address) -> Self {
        Self {
            epoch_id,
            actor,
            state: PresenceState::None,
            declared_at: None,
            validated_at: None,
            finalized_at: None,
            left_at: None,
            validation_count: 0,
            stake: None,
            slash_reason: None,
        }
    }

    /// A freshly declared presence.
    pub fn declared(
        epoch_id: EpochId,
        actor: Address,
        stake: Option<Balance>,
        now: Timestamp,
    ) -> Self {
        Self {
            state: PresenceState::Declared,
            declared_at: Some(now),
            stake,
            ..Self::new(epoch_id, actor)
        }
    }

    pub fn can_interact(&self) -> bool {
        self.state.can_interact()
    }

    pub fn is_discoverable(&self) -> bool {
        self.state.is_discoverable()
    }

    pub fn has_left(&self) -> bool {
        self.left_at.is_some()
    }

    // ── Feature gates ────────────────────────────────────────────────────────

    pub fn can_discover(&self, epoch: &Epoch, now: Timestamp) -> bool {
        check_feature(Some(epoch), self.state, Feature::Discovery, now).is_ok()
    }

    pub fn can_message(&self, epoch: &Epoch, now: Timestamp) -> bool {
        check_feature(Some(epoch), self.state, Feature::Messaging, now).is_ok()
    }

    pub fn can_capture_media(&self, epoch: &Epoch, now: Timestamp) -> bool {
        check_feature(Some(epoch), self.state, Feature::CaptureMedia, now).is_ok()
    }

    pub fn can_view_media(&self, epoch: &Epoch, now: Timestamp) -> bool {
        check_feature(Some(epoch), self.state, Feature::ViewMedia, now).is_ok()
    }

    // ── Validation progress ──────────────────────────────────────────────────

    /// Fraction of the quorum reached, in `[0, 1]`.
    ///
    /// Validated and finalized presences report 1.0; slashed and undeclared
    /// presences report 0.0.
    pub fn validation_progress(&self, quorum_size: u32) -> f64 {
        match self.state {
            PresenceState::Validated | PresenceState::Finalized => 1.0,
            PresenceState::Declared => {
                let quorum = quorum_size.max(1) as f64;
                (self.validation_count as f64 / quorum).clamp(0.0, 1.0)
            }
            PresenceState::None | PresenceState::Slashed => 0.0,
        }
    }

    /// Votes still missing before validation; 0 unless declared.
    pub fn votes_needed(&self, quorum_size: u32) -> u32 {
        if self.state != PresenceState::Declared {
            return 0;
        }
        quorum_size.saturating_sub(self.validation_count)
    }

    // ── Echo ─────────────────────────────────────────────────────────────────

    /// Hours elapsed since the actor left, or `None` if still present.
    pub fn hours_since_left(&self, now: Timestamp) -> Option<f64> {
        self.left_at
            .map(|left| (now.saturating_sub(left)).max(0) as f64 / 3600.0)
    }

    /// Current echo opacity, or `None` if the actor has not left.
    pub fn echo_opacity(&self, now: Timestamp) -> Option<f64> {
        self.hours_since_left(now).map(echo_opacity)
    }

    /// True while the departure is within the echo window.
    pub fn is_echo(&self, now: Timestamp) -> bool {
        match self.left_at {
            Some(left) => now.saturating_sub(left) < ECHO_WINDOW_SECS,
            None => false,
        }
    }

    /// Seconds of echo visibility left, zero once faded.
    pub fn echo_remaining_secs(&self, now: Timestamp) -> i64 {
        self.hours_since_left(now)
            .map(|h| ((ECHO_WINDOW_HOURS - h) * 3600.0).max(0.0) as i64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::EpochCapability;

    fn actor() -> Address {
        Address::from_bytes([0x11; 20])
    }

    fn active_epoch(capability: EpochCapability, now: Timestamp) -> Epoch {
        Epoch::new(EpochId::new(1), now - 1800, now + 1800, capability)
    }

    #[test]
    fn transition_table_is_closed() {
        use PresenceState::*;
        let legal = [
            (None, Declared),
            (Declared, Validated),
            (Declared, Slashed),
            (Validated, Finalized),
            (Validated, Slashed),
        ];
        for from in PresenceState::ALL {
            for to in PresenceState::ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    can_transition_presence(from, to),
                    expected,
                    "{from} -> {to}"
                );
                assert_eq!(from.ensure_transition(to).is_ok(), expected);
            }
        }
        assert!(Finalized.valid_next_states().is_empty());
        assert!(Slashed.valid_next_states().is_empty());
    }

    #[test]
    fn discoverable_matches_interact() {
        for s in PresenceState::ALL {
            assert_eq!(s.is_discoverable(), s.can_interact(), "{s}");
        }
    }

    #[test]
    fn predicates() {
        use PresenceState::*;
        assert!(!None.can_interact());
        assert!(Declared.can_interact());
        assert!(Validated.can_interact());
        assert!(Finalized.can_interact());
        assert!(!Slashed.can_interact());

        assert!(Finalized.is_terminal());
        assert!(Slashed.is_terminal());
        assert!(!Validated.is_terminal());

        assert!(Declared.requires_validation());
        assert!(!Validated.requires_validation());
        assert_eq!(Slashed.as_u8(), 4);
    }

    #[test]
    fn validation_progress_and_votes_needed() {
        let mut p = Presence::declared(EpochId::new(1), actor(), None, 100);
        assert_eq!(p.validation_progress(3), 0.0);
        assert_eq!(p.votes_needed(3), 3);

        p.validation_count = 2;
        assert!((p.validation_progress(3) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(p.votes_needed(3), 1);

        p.validation_count = 7;
        assert_eq!(p.validation_progress(3), 1.0);
        assert_eq!(p.votes_needed(3), 0);

        p.state = PresenceState::Validated;
        p.validation_count = 1;
        assert_eq!(p.validation_progress(3), 1.0);
        assert_eq!(p.votes_needed(3), 0);

        p.state = PresenceState::Slashed;
        assert_eq!(p.validation_progress(3), 0.0);
        assert_eq!(p.votes_needed(3), 0);
    }

    #[test]
    fn slashed_presence_denied_even_in_full_epoch() {
        let now = 1_700_000_000;
        let epoch = active_epoch(EpochCapability::PresenceWithEphemeralData, now);
        let mut p = Presence::declared(epoch.id, actor(), None, now);
        assert!(p.can_discover(&epoch, now));
        assert!(p.can_capture_media(&epoch, now));

        p.state = PresenceState::Slashed;
        assert!(!p.can_discover(&epoch, now));
        assert!(!p.can_message(&epoch, now));
        assert!(!p.can_view_media(&epoch, now));
    }

    #[test]
    fn feature_gates_follow_capability() {
        let now = 1_700_000_000;
        let epoch = active_epoch(EpochCapability::PresenceWithSignals, now);
        let p = Presence::declared(epoch.id, actor(), Some(10), now);
        assert!(p.can_discover(&epoch, now));
        assert!(p.can_message(&epoch, now));
        assert!(!p.can_capture_media(&epoch, now));

        // After the epoch ends nothing is granted.
        assert!(!p.can_discover(&epoch, now + 3600));
    }

    #[test]
    fn echo_fields() {
        let mut p = Presence::declared(EpochId::new(1), actor(), None, 0);
        assert_eq!(p.echo_opacity(100), None);
        assert!(!p.is_echo(100));

        p.left_at = Some(3600);
        assert_eq!(p.echo_opacity(3600), Some(1.0));
        assert!((p.echo_opacity(3600 + 6 * 3600).unwrap() - 0.75).abs() < 1e-9);
        assert!(p.is_echo(3600 + 23 * 3600));
        assert!(!p.is_echo(3600 + 24 * 3600));
        assert_eq!(p.echo_remaining_secs(3600 + 12 * 3600), 12 * 3600);
        assert_eq!(p.echo_remaining_secs(3600 + 48 * 3600), 0);
    }
}
