//! Validation for the `[tracking]` and `[status]` sections.

use crate::schema::GardenConfig;

use super::helpers::validate_range;

/// Validate tracking cadences.
pub(crate) fn validate_tracking(errors: &mut Vec<String>, config: &GardenConfig) {
    validate_range(
        errors,
        "tracking.heartbeat_interval_secs",
        config.tracking.heartbeat_interval_secs,
        5,
        600,
    );
    validate_range(
        errors,
        "tracking.presence_interval_secs",
        config.tracking.presence_interval_secs,
        30,
        3600,
    );
}

/// Validate the display-only admin list.
pub(crate) fn validate_status(errors: &mut Vec<String>, config: &GardenConfig) {
    for email in &config.status.admin_display_list {
        if !email.contains('@') {
            errors.push(format!(
                "status.admin_display_list entry {email:?} is not an email address"
            ));
        }
    }
}
