//! Configuration schema types for MindGarden tracking.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod backend;
mod system;
mod tracking;

pub use backend::*;
pub use system::*;
pub use tracking::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GardenConfig {
    pub backend: BackendConfig,
    pub realtime: RealtimeSettings,
    pub tracking: TrackingConfig,
    pub status: StatusConfig,
    pub locale: LocaleConfig,
    pub logging: LoggingConfig,
}
