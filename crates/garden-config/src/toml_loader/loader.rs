//! Reading a `GardenConfig` from disk.

use std::path::Path;

use garden_common::ConfigError;
use tracing::{debug, info};

use super::paths::{create_default_config, default_config_path};
use crate::schema::GardenConfig;

/// Parse the TOML file at `path`. Missing keys take their defaults.
///
/// No validation happens here; `crate::load_config_from` validates after
/// environment overrides are applied.
pub fn load_from_path(path: &Path) -> Result<GardenConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let config = toml::from_str::<GardenConfig>(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.message().to_string(),
    })?;
    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Load the per-user config, writing a commented template on first run.
pub fn load_default() -> Result<GardenConfig, ConfigError> {
    let path = default_config_path()?;
    match load_from_path(&path) {
        Err(ConfigError::NotFound(_)) => {
            debug!(path = %path.display(), "No config yet, writing template");
            create_default_config(&path)?;
            Ok(GardenConfig::default())
        }
        loaded => loaded,
    }
}
