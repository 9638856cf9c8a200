//! presence-core
//!
//! Value types and pure rules of the 7ay presence protocol: addresses,
//! the presence and epoch state machines, capability gating, echo decay,
//! and the event vocabulary shared by every other crate.

pub mod clock;
pub mod constants;
pub mod echo;
pub mod epoch;
pub mod error;
pub mod event;
pub mod gate;
pub mod presence;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use constants::*;
pub use echo::{collect_echoes, echo_opacity, Echo};
pub use epoch::{compute_epoch_state, Epoch, EpochCapability, EpochState, Geofence};
pub use error::{GateError, PresenceError};
pub use event::{PresenceEvent, Topic};
pub use gate::{check_feature, Feature};
pub use presence::{can_transition_presence, Presence, PresenceState, SlashReason};
pub use types::*;
