//! Client-local persisted flags.
//!
//! Stored as JSON at `data_dir()/mindgarden/state.json`. Only "seen
//! announcement" versions live here; the per-tab id is process memory.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use garden_common::GardenError;

const APP_DIR: &str = "mindgarden";
const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalState {
    seen_announcements: BTreeSet<String>,
}

impl LocalState {
    /// Default location, `None` if the platform has no data directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR).join(STATE_FILE))
    }

    /// Load from `path`. A missing or unreadable file yields empty state.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No local state, starting fresh");
                return Self::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt local state, starting fresh");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), GardenError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        debug!(path = %path.display(), "Local state saved");
        Ok(())
    }

    pub fn has_seen(&self, version: &str) -> bool {
        self.seen_announcements.contains(version)
    }

    /// Returns `true` if the version was not already marked.
    pub fn mark_seen(&mut self, version: &str) -> bool {
        let added = self.seen_announcements.insert(version.to_string());
        if added {
            info!(version, "Announcement marked seen");
        }
        added
    }
}
