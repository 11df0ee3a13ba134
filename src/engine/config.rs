//! Engine configuration options.

use crate::types::Address;
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Only address allowed to change markets, collaterals, hooks and global config.
    pub admin: Address,
    /// Log every emitted event at trace level.
    pub trace_events: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            admin: Address(0),
            trace_events: false,
        }
    }
}
