use presence_core::epoch::{Epoch, EpochState};
use presence_core::types::Timestamp;

/// A phase together with the moment it begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseMark {
    pub state: EpochState,
    /// `None` for phases with no clock-driven start (finalization).
    pub at: Option<Timestamp>,
    pub reached: bool,
}

/// The phases an epoch goes through, in order, marking those reached by `now`.
///
/// Finalization is an external signal, so its mark carries no timestamp.
pub fn phase_timeline(epoch: &Epoch, now: Timestamp) -> Vec<PhaseMark> {
    let current = epoch.state(now);
    let rank = |s: EpochState| match s {
        EpochState::None => 0,
        EpochState::Scheduled => 1,
        EpochState::Active => 2,
        EpochState::Closed => 3,
        EpochState::Finalized => 4,
    };
    [
        (EpochState::Scheduled, None),
        (EpochState::Active, Some(epoch.start_time)),
        (EpochState::Closed, Some(epoch.end_time)),
        (EpochState::Finalized, None),
    ]
    .into_iter()
    .map(|(state, at)| PhaseMark {
        state,
        at,
        reached: rank(current) >= rank(state),
    })
    .collect()
}
