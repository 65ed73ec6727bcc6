//! Types shared by every MindGarden crate.

pub mod errors;
pub mod id;
pub mod notices;

pub use errors::{ConfigError, GardenError, Result, TrackingError};
pub use id::{new_id, tab_session_id, SessionId};
pub use notices::{Notice, NoticeLevel, NoticeQueue};
