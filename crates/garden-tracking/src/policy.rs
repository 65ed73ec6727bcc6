//! The one place tracking failures are turned into log lines.
//!
//! Tracking is non-critical: a failed heartbeat or page view degrades
//! observability, never the hosting flow. Components return
//! `Result<_, TrackingError>` internally and hand it to [`absorb`].

use std::fmt;

use tracing::{debug, warn};

use garden_common::TrackingError;

/// The tracking call a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SessionStart,
    Heartbeat,
    SessionEnd,
    PageView,
    Presence,
    UnreadCount,
    UnreadSubscribe,
    RoleCheck,
    ProfileFetch,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Self::SessionStart => "session start",
            Self::Heartbeat => "heartbeat",
            Self::SessionEnd => "session end",
            Self::PageView => "page view",
            Self::Presence => "presence update",
            Self::UnreadCount => "unread count",
            Self::UnreadSubscribe => "unread subscription",
            Self::RoleCheck => "role check",
            Self::ProfileFetch => "profile fetch",
        }
    }

    /// Page views are high-volume and fail quietly.
    fn is_quiet(self) -> bool {
        matches!(self, Self::PageView)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a failure should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Transient network or remote error: log and move on.
    Silent,
    /// Rate limit or quota: show the user a transient notice.
    Notice,
    /// Authorization failure: fall back to the non-privileged default.
    Denied,
}

pub fn classify(err: &TrackingError) -> FailureClass {
    match err {
        TrackingError::RateLimited | TrackingError::QuotaExceeded => FailureClass::Notice,
        TrackingError::Unauthorized(_) => FailureClass::Denied,
        TrackingError::Network(_)
        | TrackingError::Remote { .. }
        | TrackingError::Decode(_)
        | TrackingError::Subscription(_)
        | TrackingError::Closed => FailureClass::Silent,
    }
}

/// Log a failed tracking call and swallow it.
pub fn absorb<T>(op: Operation, result: Result<T, TrackingError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            let class = classify(&err);
            if op.is_quiet() {
                debug!(operation = %op, ?class, error = %err, "Tracking call failed");
            } else {
                warn!(operation = %op, ?class, error = %err, "Tracking call failed");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_passes_through() {
        assert_eq!(absorb(Operation::Presence, Ok::<_, TrackingError>(7)), Some(7));
    }

    #[test]
    fn errors_become_none() {
        let err = TrackingError::Network("connection reset".into());
        assert_eq!(absorb::<()>(Operation::Heartbeat, Err(err.clone())), None);
        assert_eq!(absorb::<()>(Operation::PageView, Err(err)), None);
    }

    #[test]
    fn classification() {
        assert_eq!(classify(&TrackingError::RateLimited), FailureClass::Notice);
        assert_eq!(classify(&TrackingError::QuotaExceeded), FailureClass::Notice);
        assert_eq!(
            classify(&TrackingError::Unauthorized("no role".into())),
            FailureClass::Denied
        );
        assert_eq!(
            classify(&TrackingError::Remote {
                status: 500,
                message: String::new()
            }),
            FailureClass::Silent
        );
        assert_eq!(classify(&TrackingError::Closed), FailureClass::Silent);
    }

    #[test]
    fn operation_names() {
        assert_eq!(Operation::UnreadCount.to_string(), "unread count");
    }
}
