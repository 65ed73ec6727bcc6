//! Table, column and remote function names used by the tracking layer.

pub mod tables {
    pub const PAGE_VIEWS: &str = "page_views";
    pub const PROFILES: &str = "profiles";
    pub const MESSAGES: &str = "messages";
}

pub mod columns {
    pub const ID: &str = "id";
    pub const LAST_SEEN: &str = "last_seen";
    pub const RECIPIENT_ID: &str = "recipient_id";
    pub const READ: &str = "read";
}

pub mod functions {
    /// Session telemetry ingestion (`start` / `heartbeat` / `end`).
    pub const SESSION_TRACKER: &str = "session-tracker";
    pub const TRANSLATE: &str = "translate";
    pub const ICEBREAKER: &str = "generate-icebreaker";
}

pub mod procedures {
    /// `has_role(_user_id uuid, _role text) returns boolean`.
    pub const HAS_ROLE: &str = "has_role";
}
