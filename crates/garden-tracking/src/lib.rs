//! Presence and engagement tracking for MindGarden.
//!
//! Every component takes its backend and configuration explicitly. Network
//! work runs in spawned tasks behind a [`TaskHandle`](scheduler::TaskHandle);
//! tracking failures go through [`policy::absorb`] and never reach callers.

pub mod assist;
pub mod local_state;
pub mod page_view;
pub mod policy;
pub mod presence;
pub mod scheduler;
pub mod session;
pub mod status;
pub mod tracked_view;
pub mod unread;

pub use assist::Assist;
pub use local_state::LocalState;
pub use page_view::{PageViewRecord, PageViewRecorder};
pub use policy::{absorb, classify, FailureClass, Operation};
pub use presence::PresenceUpdater;
pub use scheduler::TaskHandle;
pub use session::{Session, SessionTracker};
pub use status::{DerivedStatus, Profile, RoleChecker, Tier};
pub use tracked_view::TrackedView;
pub use unread::UnreadCounter;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock component state; a panicked holder leaves it usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
