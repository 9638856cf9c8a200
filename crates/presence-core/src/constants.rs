/// ─── 7ay Presence Protocol Constants ────────────────────────────────────────
///
/// Epochs are the unit of ephemerality: everything an actor does inside an
/// epoch is bound to it and disappears when it closes.

// ── Identity ─────────────────────────────────────────────────────────────────

/// Length of an actor address in bytes.
pub const ADDRESS_LEN: usize = 20;

// ── Validation ───────────────────────────────────────────────────────────────

/// Validation votes required to promote a presence from declared to validated.
pub const DEFAULT_QUORUM_SIZE: u32 = 3;

// ── Echo decay ───────────────────────────────────────────────────────────────

/// How long a departed presence stays visible as an echo (seconds).
pub const ECHO_WINDOW_SECS: i64 = 24 * 3600;

/// Echo window expressed in hours; opacity falls linearly to zero across it.
pub const ECHO_WINDOW_HOURS: f64 = 24.0;

/// Echoes at or below this opacity are considered fully faded.
pub const ECHO_VISIBILITY_THRESHOLD: f64 = 0.05;

// ── Runtime ──────────────────────────────────────────────────────────────────

/// Buffered events per subscriber before a slow reader starts lagging.
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// Default phase monitor polling interval (seconds).
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 1;
