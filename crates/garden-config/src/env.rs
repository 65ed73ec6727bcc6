//! Environment variable overrides.
//!
//! Credentials are usually injected by the deployment rather than
//! written to the config file, so the environment wins over TOML.

use crate::schema::GardenConfig;

pub const PROJECT_REF_VAR: &str = "GARDEN_SUPABASE_PROJECT_REF";
pub const ANON_KEY_VAR: &str = "GARDEN_SUPABASE_ANON_KEY";
pub const ACCESS_TOKEN_VAR: &str = "GARDEN_ACCESS_TOKEN";
pub const URL_VAR: &str = "GARDEN_SUPABASE_URL";

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut GardenConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary lookup (used by tests).
pub fn apply_overrides_from<F>(config: &mut GardenConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(project_ref) = non_empty(PROJECT_REF_VAR) {
        tracing::debug!("project ref overridden from {PROJECT_REF_VAR}");
        config.backend.project_ref = project_ref;
    }
    if let Some(key) = non_empty(ANON_KEY_VAR) {
        tracing::debug!("anon key overridden from {ANON_KEY_VAR}");
        config.backend.api_key = key;
    }
    if let Some(token) = non_empty(ACCESS_TOKEN_VAR) {
        config.backend.access_token = Some(token);
    }
    if let Some(url) = non_empty(URL_VAR) {
        config.backend.url = Some(url);
    }
}
