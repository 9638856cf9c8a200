use serde::{Deserialize, Serialize};
use std::fmt;

use crate::epoch::{Epoch, EpochState};
use crate::error::GateError;
use crate::presence::PresenceState;
use crate::types::Timestamp;

/// A feature an epoch may or may not grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Discovery,
    Messaging,
    CaptureMedia,
    ViewMedia,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Feature::Discovery => "discovery",
            Feature::Messaging => "messaging",
            Feature::CaptureMedia => "capture_media",
            Feature::ViewMedia => "view_media",
        };
        f.write_str(s)
    }
}

/// Decide whether an actor in `presence` may use `feature` in `epoch` at `now`.
///
/// Gates, in order, short-circuiting on the first failure:
///   1. the epoch exists and is active
///   2. the epoch's capability level includes the feature
///   3. the actor's own presence state can interact
///
/// A missing epoch is reported as `EpochNotActive { state: None }`.
pub fn check_feature(
    epoch: Option<&Epoch>,
    presence: PresenceState,
    feature: Feature,
    now: Timestamp,
) -> Result<(), GateError> {
    let state = epoch.map(|e| e.state(now)).unwrap_or(EpochState::None);
    let Some(epoch) = epoch.filter(|_| state == EpochState::Active) else {
        return Err(GateError::EpochNotActive { state });
    };

    if !epoch.capability.supports(feature) {
        return Err(GateError::CapabilityNotSupported {
            capability: epoch.capability,
            feature,
        });
    }

    if !presence.can_interact() {
        return Err(GateError::PresenceNotInteractive { state: presence });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::EpochCapability;
    use crate::types::EpochId;

    const NOW: Timestamp = 2_000_000_000;

    fn epoch(capability: EpochCapability) -> Epoch {
        Epoch::new(EpochId::new(3), NOW - 60, NOW + 60, capability)
    }

    #[test]
    fn all_gates_pass() {
        let e = epoch(EpochCapability::PresenceWithEphemeralData);
        for f in [Feature::Discovery, Feature::Messaging, Feature::CaptureMedia, Feature::ViewMedia] {
            assert_eq!(check_feature(Some(&e), PresenceState::Validated, f, NOW), Ok(()));
        }
    }

    #[test]
    fn phase_gate_reported_first() {
        // Every gate fails; the phase gate must be the one reported.
        let e = epoch(EpochCapability::PresenceOnly);
        let err = check_feature(Some(&e), PresenceState::Slashed, Feature::Messaging, NOW + 600)
            .unwrap_err();
        assert_eq!(err, GateError::EpochNotActive { state: EpochState::Closed });
        assert_eq!(err.reason(), "epoch_not_active");

        let err = check_feature(None, PresenceState::Declared, Feature::Discovery, NOW).unwrap_err();
        assert_eq!(err, GateError::EpochNotActive { state: EpochState::None });
    }

    #[test]
    fn capability_gate_before_presence_gate() {
        let e = epoch(EpochCapability::PresenceOnly);
        let err = check_feature(Some(&e), PresenceState::None, Feature::CaptureMedia, NOW)
            .unwrap_err();
        assert_eq!(
            err,
            GateError::CapabilityNotSupported {
                capability: EpochCapability::PresenceOnly,
                feature: Feature::CaptureMedia,
            }
        );
    }

    #[test]
    fn presence_gate_denies_non_interactive() {
        let e = epoch(EpochCapability::PresenceWithEphemeralData);
        for s in [PresenceState::None, PresenceState::Slashed] {
            let err = check_feature(Some(&e), s, Feature::Discovery, NOW).unwrap_err();
            assert_eq!(err, GateError::PresenceNotInteractive { state: s });
            assert_eq!(err.reason(), "presence_not_interactive");
        }
    }

    #[test]
    fn never_granted_without_interaction() {
        let e = epoch(EpochCapability::PresenceWithEphemeralData);
        for s in PresenceState::ALL {
            for now in [NOW - 120, NOW, NOW + 120] {
                let granted = check_feature(Some(&e), s, Feature::Discovery, now).is_ok();
                if granted {
                    assert!(s.can_interact());
                }
            }
        }
    }
}
