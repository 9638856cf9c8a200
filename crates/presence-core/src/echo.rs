//! Echo decay: departed presences fade out over 24 hours.

use crate::constants::{ECHO_VISIBILITY_THRESHOLD, ECHO_WINDOW_HOURS};
use crate::presence::Presence;
use crate::types::Timestamp;

/// Opacity of an echo `hours_since_left` hours after departure.
///
/// Linear fade from 1.0 at departure to 0.0 at the end of the window.
pub fn echo_opacity(hours_since_left: f64) -> f64 {
    (1.0 - hours_since_left / ECHO_WINDOW_HOURS).clamp(0.0, 1.0)
}

/// A departed presence together with its current opacity.
#[derive(Clone, Debug, PartialEq)]
pub struct Echo {
    pub presence: Presence,
    pub opacity: f64,
}

/// Build the echo listing for a set of presences at `now`.
///
/// Only presences with a `left_at` stamp whose opacity is still above
/// [`ECHO_VISIBILITY_THRESHOLD`] are kept, most recent departure first.
pub fn collect_echoes<I>(presences: I, now: Timestamp) -> Vec<Echo>
where
    I: IntoIterator<Item = Presence>,
{
    let mut echoes: Vec<Echo> = presences
        .into_iter()
        .filter_map(|presence| {
            let opacity = presence.echo_opacity(now)?;
            (opacity > ECHO_VISIBILITY_THRESHOLD).then_some(Echo { presence, opacity })
        })
        .collect();
    echoes.sort_by(|a, b| b.presence.left_at.cmp(&a.presence.left_at));
    echoes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, EpochId};

    fn left(byte: u8, left_at: Option<Timestamp>) -> Presence {
        let mut p = Presence::declared(EpochId::new(1), Address::from_bytes([byte; 20]), None, 0);
        p.left_at = left_at;
        p
    }

    #[test]
    fn opacity_endpoints() {
        assert_eq!(echo_opacity(0.0), 1.0);
        assert_eq!(echo_opacity(12.0), 0.5);
        assert_eq!(echo_opacity(24.0), 0.0);
        assert_eq!(echo_opacity(100.0), 0.0);
        assert_eq!(echo_opacity(-1.0), 1.0);
    }

    #[test]
    fn opacity_is_non_increasing() {
        let mut last = f64::INFINITY;
        for step in 0..=300 {
            let h = step as f64 * 0.1;
            let o = echo_opacity(h);
            assert!(o <= last, "opacity rose at {h}h");
            last = o;
        }
    }

    #[test]
    fn filtered_and_sorted() {
        let now = 100 * 3600;
        let presences = vec![
            left(1, Some(now - 2 * 3600)),
            left(2, None),
            left(3, Some(now - 30 * 60)),
            left(4, Some(now - 24 * 3600)),
            // 23h → opacity ≈ 0.042, below the threshold.
            left(5, Some(now - 23 * 3600)),
            left(6, Some(now - 10 * 3600)),
        ];
        let echoes = collect_echoes(presences, now);
        let order: Vec<u8> = echoes.iter().map(|e| e.presence.actor.0[0]).collect();
        assert_eq!(order, vec![3, 1, 6]);
        assert!(echoes.iter().all(|e| e.opacity > ECHO_VISIBILITY_THRESHOLD));
    }
}
