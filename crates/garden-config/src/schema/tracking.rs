//! Tracking cadence and status-resolution settings.

use serde::{Deserialize, Serialize};

/// Session, presence and unread tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Master switch; when off every tracker is inert.
    pub enabled: bool,
    /// Seconds between session heartbeats.
    pub heartbeat_interval_secs: u32,
    /// Seconds between presence (`last_seen`) updates.
    pub presence_interval_secs: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval_secs: 30,
            presence_interval_secs: 300,
        }
    }
}

/// Inputs of the derived status resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Emails shown as admins in the UI. Display-only: never used to
    /// authorize anything.
    pub admin_display_list: Vec<String>,
}
