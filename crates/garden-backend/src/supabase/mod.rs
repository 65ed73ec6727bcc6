//! Supabase implementation of [`Backend`](crate::Backend).
//!
//! Table reads and writes go through PostgREST (`/rest/v1`), procedures
//! through `/rest/v1/rpc`, serverless functions through `/functions/v1`, and
//! change feeds through a single lazily-opened Realtime connection.

mod api;
mod changes;
mod client;
mod rest;

pub use client::SupabaseBackend;
