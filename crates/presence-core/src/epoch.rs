use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gate::Feature;
use crate::types::{Address, EpochId, Timestamp};

// ── EpochState ───────────────────────────────────────────────────────────────

/// Phase of an epoch. Never stored; always recomputed from timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EpochState {
    #[default]
    None,
    Scheduled,
    Active,
    Closed,
    Finalized,
}

impl EpochState {
    pub fn allows_declarations(self) -> bool {
        matches!(self, EpochState::Active)
    }

    /// Closed and finalized epochs have had (or are about to have) their
    /// ephemeral data purged.
    pub fn is_past_active(self) -> bool {
        matches!(self, EpochState::Closed | EpochState::Finalized)
    }
}

impl fmt::Display for EpochState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EpochState::None => "none",
            EpochState::Scheduled => "scheduled",
            EpochState::Active => "active",
            EpochState::Closed => "closed",
            EpochState::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// Phase of an epoch as a pure function of its flags and the clock.
///
/// `finalized` overrides the time-based phases; `start <= now < end` is active.
pub fn compute_epoch_state(
    exists: bool,
    finalized: bool,
    start_time: Timestamp,
    end_time: Timestamp,
    now: Timestamp,
) -> EpochState {
    if !exists {
        return EpochState::None;
    }
    if finalized {
        return EpochState::Finalized;
    }
    if now < start_time {
        EpochState::Scheduled
    } else if now < end_time {
        EpochState::Active
    } else {
        EpochState::Closed
    }
}

// ── EpochCapability ──────────────────────────────────────────────────────────

/// Feature level granted by an epoch, independent of its phase.
///
/// Levels form a total order; each one includes every feature of the levels
/// below it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EpochCapability {
    #[default]
    PresenceOnly,
    PresenceWithSignals,
    PresenceWithEphemeralData,
}

impl EpochCapability {
    /// Lowest to highest.
    pub const ORDERED: [EpochCapability; 3] = [
        EpochCapability::PresenceOnly,
        EpochCapability::PresenceWithSignals,
        EpochCapability::PresenceWithEphemeralData,
    ];

    /// Position in the capability order.
    pub fn rank(self) -> u8 {
        match self {
            EpochCapability::PresenceOnly => 0,
            EpochCapability::PresenceWithSignals => 1,
            EpochCapability::PresenceWithEphemeralData => 2,
        }
    }

    pub fn from_rank(rank: u8) -> Option<Self> {
        Self::ORDERED.get(rank as usize).copied()
    }

    pub fn supports_discovery(self) -> bool {
        true
    }

    pub fn supports_messaging(self) -> bool {
        self >= EpochCapability::PresenceWithSignals
    }

    pub fn supports_media(self) -> bool {
        self >= EpochCapability::PresenceWithEphemeralData
    }

    pub fn supports(self, feature: Feature) -> bool {
        match feature {
            Feature::Discovery => self.supports_discovery(),
            Feature::Messaging => self.supports_messaging(),
            Feature::CaptureMedia | Feature::ViewMedia => self.supports_media(),
        }
    }

    /// Lowest capability level that grants `feature`.
    pub fn minimum_for(feature: Feature) -> Self {
        Self::ORDERED
            .into_iter()
            .find(|c| c.supports(feature))
            .unwrap_or(EpochCapability::PresenceWithEphemeralData)
    }
}

impl PartialOrd for EpochCapability {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EpochCapability {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for EpochCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EpochCapability::PresenceOnly => "presence_only",
            EpochCapability::PresenceWithSignals => "presence_with_signals",
            EpochCapability::PresenceWithEphemeralData => "presence_with_ephemeral_data",
        };
        f.write_str(s)
    }
}

// ── Geofence ─────────────────────────────────────────────────────────────────

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Circular area an epoch is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl Geofence {
    /// Great-circle distance from the fence centre (haversine).
    pub fn distance_meters(&self, latitude: f64, longitude: f64) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), latitude.to_radians());
        let dlat = (latitude - self.latitude).to_radians();
        let dlon = (longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().asin()
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.distance_meters(latitude, longitude) <= self.radius_meters
    }
}

// ── Epoch ────────────────────────────────────────────────────────────────────

/// A time-boxed scope for all presence activity.
///
/// The record only ever changes through finalization and counter updates;
/// its phase is derived from `start_time`/`end_time` on every query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Epoch {
    pub id: EpochId,
    /// Contract the epoch is anchored to, when bridged on-chain.
    pub contract_address: Option<Address>,
    pub chain_id: u64,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub finalized: bool,
    pub exists: bool,
    pub capability: EpochCapability,
    pub participant_count: u32,
    pub validated_count: u32,
    pub geofence: Option<Geofence>,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

impl Epoch {
    pub fn new(
        id: EpochId,
        start_time: Timestamp,
        end_time: Timestamp,
        capability: EpochCapability,
    ) -> Self {
        Self {
            id,
            contract_address: None,
            chain_id: 0,
            start_time,
            end_time,
            finalized: false,
            exists: true,
            capability,
            participant_count: 0,
            validated_count: 0,
            geofence: None,
            tags: Vec::new(),
            description: None,
        }
    }

    pub fn state(&self, now: Timestamp) -> EpochState {
        compute_epoch_state(self.exists, self.finalized, self.start_time, self.end_time, now)
    }

    pub fn is_active(&self, now: Timestamp) -> bool {
        self.state(now) == EpochState::Active
    }

    pub fn duration(&self) -> i64 {
        self.end_time.saturating_sub(self.start_time).max(0)
    }

    /// Seconds until the next time-driven phase change.
    ///
    /// Scheduled epochs count down to start, active ones to end. Closed and
    /// finalized epochs have no further time-driven phase.
    pub fn time_until_next_phase(&self, now: Timestamp) -> Option<i64> {
        match self.state(now) {
            EpochState::Scheduled => Some(self.start_time.saturating_sub(now)),
            EpochState::Active => Some(self.end_time.saturating_sub(now)),
            _ => None,
        }
    }

    /// Seconds left while active, zero otherwise.
    pub fn time_remaining(&self, now: Timestamp) -> i64 {
        match self.state(now) {
            EpochState::Active => self.end_time.saturating_sub(now),
            _ => 0,
        }
    }

    /// Elapsed fraction of the active window, clamped to `[0, 1]`.
    pub fn progress(&self, now: Timestamp) -> f64 {
        let duration = self.duration();
        if duration == 0 {
            return if now >= self.end_time { 1.0 } else { 0.0 };
        }
        (now.saturating_sub(self.start_time) as f64 / duration as f64).clamp(0.0, 1.0)
    }

    fn active_and(&self, now: Timestamp, supported: bool) -> bool {
        supported && self.is_active(now)
    }

    pub fn supports_discovery(&self, now: Timestamp) -> bool {
        self.active_and(now, self.capability.supports_discovery())
    }

    pub fn supports_messaging(&self, now: Timestamp) -> bool {
        self.active_and(now, self.capability.supports_messaging())
    }

    pub fn supports_media(&self, now: Timestamp) -> bool {
        self.active_and(now, self.capability.supports_media())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}
