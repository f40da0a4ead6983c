//! Mediaflow API server library.
//!
//! Exposes the server building blocks (config, state, error handling,
//! routes, WebSocket sessions, background tasks) so integration tests and
//! the binary entrypoint can both access them.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
