//! MindGarden tracking configuration.
//!
//! TOML-based configuration with environment overrides and validation.
//! Every section uses serde defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use garden_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod env;
pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{GardenConfig, CONFIG_SCHEMA_VERSION};

use garden_common::ConfigError;

/// Load config from the platform default path, apply environment
/// overrides, and validate the result.
pub fn load_config() -> Result<GardenConfig, ConfigError> {
    let mut config = toml_loader::load_default()?;
    env::apply_env_overrides(&mut config);
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from an explicit path, apply environment overrides, and
/// validate the result.
pub fn load_config_from(path: &std::path::Path) -> Result<GardenConfig, ConfigError> {
    let mut config = toml_loader::load_from_path(path)?;
    env::apply_env_overrides(&mut config);
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string with secrets removed.
pub fn config_to_json(config: &GardenConfig) -> String {
    let mut redacted = config.clone();
    if !redacted.backend.api_key.is_empty() {
        redacted.backend.api_key = "[REDACTED]".to_string();
    }
    if redacted.backend.access_token.is_some() {
        redacted.backend.access_token = Some("[REDACTED]".to_string());
    }
    serde_json::to_string_pretty(&redacted)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let json = config_to_json(&GardenConfig::default());
        assert!(json.contains("\"backend\""));
        assert!(json.contains("\"realtime\""));
        assert!(json.contains("\"tracking\""));
        assert!(json.contains("\"status\""));
        assert!(json.contains("\"locale\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_to_json_redacts_secrets() {
        let mut config = GardenConfig::default();
        config.backend.api_key = "anon-secret".into();
        config.backend.access_token = Some("jwt-secret".into());
        let json = config_to_json(&config);
        assert!(!json.contains("anon-secret"));
        assert!(!json.contains("jwt-secret"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn load_config_from_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tracking]\nheartbeat_interval_secs = 0\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
