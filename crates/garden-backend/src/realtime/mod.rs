//! Minimal Supabase Realtime client speaking Phoenix Channels v1.
//!
//! Only `postgres_changes` delivery is supported. The socket reconnects
//! with exponential backoff and re-joins its channels.

mod client;
mod connection;
mod handler;
mod types;

pub use client::RealtimeClient;
pub use types::{ChannelConfig, PhoenixMessage, PostgresChangesConfig, RealtimeConfig, RealtimeEvent};
