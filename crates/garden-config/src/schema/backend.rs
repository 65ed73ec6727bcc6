//! Remote backend connection settings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supabase project coordinates and credentials.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Supabase project reference (the subdomain of `*.supabase.co`).
    pub project_ref: String,
    /// Publishable anon key.
    pub api_key: String,
    /// JWT of the signed-in user, if any.
    pub access_token: Option<String>,
    /// Full base URL override (self-hosted or local stacks).
    pub url: Option<String>,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            project_ref: String::new(),
            api_key: String::new(),
            access_token: None,
            url: None,
            request_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    /// Base URL of the project, e.g. `https://abc.supabase.co`.
    pub fn base_url(&self) -> String {
        match &self.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.supabase.co", self.project_ref),
        }
    }

    /// Whether enough is configured to talk to a real project.
    pub fn is_configured(&self) -> bool {
        (!self.project_ref.is_empty() || self.url.is_some()) && !self.api_key.is_empty()
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("url", &self.url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Realtime (WebSocket) connection behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// Phoenix heartbeat interval in seconds.
    pub heartbeat_interval_secs: u32,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u32,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u32,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}
