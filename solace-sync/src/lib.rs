//! Chat session synchronization engine for Solace clients.
//!
//! One [`session::SessionEngine`] manages one open conversation: it seeds
//! history over REST, keeps a live WebSocket to the backend, reconciles
//! optimistic local sends against server echoes, degrades to polling when
//! the socket is unavailable, and reconnects after clean closes. The
//! embedding app supplies credentials via [`auth::AuthProvider`] and
//! consumes [`session::SessionEvent`]s to drive its UI.

pub mod api;
pub mod auth;
pub mod config;
pub mod connection;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod transport;
