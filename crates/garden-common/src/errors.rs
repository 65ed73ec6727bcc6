use std::path::PathBuf;

/// Why a configuration could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config file at {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: invalid TOML: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("this platform has no config directory")]
    NoConfigDir,

    /// Every out-of-range or malformed field, in section order.
    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Failures of a call against the remote backend.
///
/// Tracking code never lets these reach the caller; see
/// `garden_tracking::policy` for how each variant is handled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackingError {
    #[error("network: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("rate limited by backend")]
    RateLimited,

    #[error("backend quota exhausted")]
    QuotaExceeded,

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("change subscription failed: {0}")]
    Subscription(String),

    #[error("backend is shut down")]
    Closed,
}

impl TrackingError {
    /// The backend is asking the client to back off.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited | Self::QuotaExceeded)
    }
}

/// Top-level error of the `garden-tracker` binary.
#[derive(Debug, thiserror::Error)]
pub enum GardenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = GardenError> = std::result::Result<T, E>;
