//! Remote backend contract for MindGarden tracking.
//!
//! The tracking layer only ever talks to the hosted backend through the
//! [`Backend`] trait. Two implementations ship here:
//!
//! - [`SupabaseBackend`]: PostgREST and Edge Functions over `reqwest`,
//!   change notifications over Supabase Realtime (Phoenix Channels).
//! - [`MemoryBackend`]: an in-process store with the same semantics,
//!   used by tests and offline runs.

pub mod change;
pub mod filter;
pub mod memory;
pub mod realtime;
pub mod schema;
pub mod supabase;

use async_trait::async_trait;
use serde_json::Value;

use garden_common::TrackingError;

pub use change::{ChangeEvent, ChangeKind, Subscription};
pub use filter::{Condition, Filter};
pub use memory::{MemoryBackend, MemoryOp};
pub use supabase::SupabaseBackend;

/// Operations the tracking layer needs from the hosted backend.
///
/// Every method is a suspension point; none of them may block the caller's
/// thread. Errors are returned, never panicked.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Append one row to `table`.
    async fn insert(&self, table: &str, record: Value) -> Result<(), TrackingError>;

    /// Fetch the rows of `table` matching `filter`.
    async fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Value>, TrackingError>;

    /// Count the rows of `table` matching `filter`.
    async fn aggregate_count(&self, table: &str, filter: &Filter) -> Result<u64, TrackingError>;

    /// Merge `patch` into every row of `table` matching `filter`.
    async fn update(&self, table: &str, filter: &Filter, patch: Value)
        -> Result<(), TrackingError>;

    /// Open a change feed for rows of `table` matching `filter`.
    async fn subscribe(
        &self,
        table: &str,
        filter: &Filter,
        kinds: &[ChangeKind],
    ) -> Result<Subscription, TrackingError>;

    /// Call a database procedure (authoritative checks such as roles).
    async fn rpc(&self, name: &str, payload: Value) -> Result<Value, TrackingError>;

    /// Invoke a serverless function (telemetry ingestion, AI assists).
    async fn invoke_function(&self, name: &str, payload: Value) -> Result<Value, TrackingError>;
}
