use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fresh random (v4) identifier in hyphenated form.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Identifier of one tracking session, i.e. one mounted view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static TAB_SESSION_ID: OnceLock<String> = OnceLock::new();

/// Grouping key shared by every page view recorded by this process.
///
/// Created on first use and immutable afterwards.
pub fn tab_session_id() -> &'static str {
    TAB_SESSION_ID.get_or_init(|| {
        let id = new_id();
        tracing::debug!(tab_session_id = %id, "Created tab session id");
        id
    })
}
