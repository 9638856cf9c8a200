pub mod monitor;
pub mod quorum;

pub use monitor::{MonitorConfig, PhaseMonitor, TickReport};
pub use quorum::{QuorumConfig, QuorumValidator, VoteOutcome};
