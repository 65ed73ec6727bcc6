//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# MindGarden tracking configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[backend]
# project_ref = ""          # <ref>.supabase.co, 20 lowercase alphanumerics
# api_key = ""              # or GARDEN_SUPABASE_ANON_KEY
# url = "http://localhost:54321"
# request_timeout_secs = 10 # 1-120

[realtime]
# heartbeat_interval_secs = 25   # 5-60
# reconnect_delay_secs = 1       # 1-30
# max_reconnect_delay_secs = 30  # 1-300

[tracking]
# enabled = true
# heartbeat_interval_secs = 30   # 5-600
# presence_interval_secs = 300   # 30-3600

[status]
# Display-only admin badges. Never used for access control.
# admin_display_list = []

[locale]
# language = "en"           # en | es

[logging]
# level = "info"            # trace | debug | info | warn | error
# show_targets = false
"##
    .to_string()
}
