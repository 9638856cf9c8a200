use std::path::Path;

use presence_consensus::{MonitorConfig, QuorumConfig};
use presence_core::error::PresenceError;
use serde::{Deserialize, Serialize};

/// Node settings, loadable from a JSON file. Missing sections take defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub quorum: QuorumConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, PresenceError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            PresenceError::Configuration(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, PresenceError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PresenceError::Configuration(format!("parsing node config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PresenceError> {
        self.quorum.validate()?;
        self.monitor.validate()
    }
}
