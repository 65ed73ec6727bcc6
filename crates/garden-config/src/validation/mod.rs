//! Range and format checks, one submodule per config section.

mod backend;
mod helpers;
mod tracking;


use crate::schema::GardenConfig;
use garden_common::ConfigError;

/// Check every section, reporting all problems at once.
pub fn validate(config: &GardenConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    backend::validate_backend(&mut errors, config);
    backend::validate_realtime(&mut errors, config);
    tracking::validate_tracking(&mut errors, config);
    tracking::validate_status(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors))
    }
}
