//! presence-node
//!
//! Wires the store, cache, quorum validator and phase monitor into one
//! running node, and exposes the line-oriented operator console the daemon
//! reads from stdin.

pub mod config;
pub mod console;
pub mod node;

pub use config::NodeConfig;
pub use node::Node;
