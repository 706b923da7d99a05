//! Solace chat backend library.
//!
//! An axum server exposing the REST and WebSocket surface the sync engine
//! talks to: direct-chat setup, message history, an HTTP send path, read
//! receipts, and a per-room socket that broadcasts message events. State is
//! in memory only; this backend exists for engine development and tests.

pub mod config;
pub mod rooms;
pub mod server;
pub mod store;
