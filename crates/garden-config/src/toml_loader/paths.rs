//! Where the config file lives.

use std::path::{Path, PathBuf};

use garden_common::ConfigError;
use tracing::info;

use super::template::default_config_toml;

/// Directory name under the OS config and data directories.
pub(crate) const APP_DIR: &str = "mindgarden";

/// `<config dir>/mindgarden/config.toml`, e.g. `~/.config/mindgarden/config.toml`
/// on Linux.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Write the commented template to `path`, creating parent directories.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, default_config_toml()).map_err(io_error)?;
    info!(path = %path.display(), "Wrote default config");
    Ok(())
}
