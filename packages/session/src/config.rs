//! Session configuration

use std::time::Duration;

use plaid_editor::ConflictMarkers;
use plaid_model::LayerRoles;
use serde::{Deserialize, Serialize};

use crate::errors::SessionError;

/// Knobs of one document session. Every field has a default, so a partial
/// JSON document is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// How long to wait for a liveness acknowledgment on the event channel
    pub liveness_timeout_ms: u64,
    /// Capacity of the parsed push-event channel
    pub event_buffer: usize,
    pub conflict_markers: ConflictMarkers,
    pub roles: LayerRoles,
    pub history_row_height: f64,
    pub history_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            liveness_timeout_ms: 5_000,
            event_buffer: 100,
            conflict_markers: ConflictMarkers::default(),
            roles: LayerRoles::default(),
            history_row_height: 120.0,
            history_buffer: 5,
        }
    }
}

impl SessionConfig {
    pub fn from_json(source: &str) -> Result<Self, SessionError> {
        let config: SessionConfig =
            serde_json::from_str(source).map_err(|e| SessionError::Config(e.to_string()))?;
        if config.event_buffer == 0 {
            return Err(SessionError::Config("eventBuffer must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }
}
