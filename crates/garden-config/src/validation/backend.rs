//! Validation for the `[backend]` and `[realtime]` sections.

use regex::Regex;

use crate::schema::GardenConfig;

use super::helpers::validate_range;

const PROJECT_REF_PATTERN: &str = r"^[a-z0-9]{20}$";

/// Validate backend coordinates.
pub(crate) fn validate_backend(errors: &mut Vec<String>, config: &GardenConfig) {
    let backend = &config.backend;

    // An empty ref is allowed: the CLI then runs against the in-memory backend.
    if !backend.project_ref.is_empty() {
        match Regex::new(PROJECT_REF_PATTERN) {
            Ok(re) if !re.is_match(&backend.project_ref) => errors.push(format!(
                "backend.project_ref = {:?} must be 20 lowercase alphanumerics",
                backend.project_ref
            )),
            Ok(_) => {}
            Err(e) => errors.push(format!("backend.project_ref pattern error: {e}")),
        }
    }

    if let Some(url) = &backend.url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!("backend.url = {url:?} must be an http(s) URL"));
        }
    }

    validate_range(
        errors,
        "backend.request_timeout_secs",
        backend.request_timeout_secs,
        1,
        120,
    );
}

/// Validate realtime connection timings.
pub(crate) fn validate_realtime(errors: &mut Vec<String>, config: &GardenConfig) {
    let rt = &config.realtime;
    validate_range(
        errors,
        "realtime.heartbeat_interval_secs",
        rt.heartbeat_interval_secs,
        5,
        60,
    );
    validate_range(
        errors,
        "realtime.reconnect_delay_secs",
        rt.reconnect_delay_secs,
        1,
        30,
    );
    validate_range(
        errors,
        "realtime.max_reconnect_delay_secs",
        rt.max_reconnect_delay_secs,
        1,
        300,
    );
    if rt.reconnect_delay_secs > rt.max_reconnect_delay_secs {
        errors.push(format!(
            "realtime.reconnect_delay_secs = {} exceeds realtime.max_reconnect_delay_secs = {}",
            rt.reconnect_delay_secs, rt.max_reconnect_delay_secs
        ));
    }
}
