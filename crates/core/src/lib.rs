//! Domain logic shared by the mediaflow service.
//!
//! Nothing in this crate touches the network, the status store or the
//! external download tool. It holds request validation, fingerprinting,
//! title sanitizing, progress-line parsing and the event/status vocabulary
//! the other crates exchange.

pub mod artifacts;
pub mod error;
pub mod fingerprint;
pub mod job_events;
pub mod progress;
pub mod request;
pub mod sanitize;
pub mod status;
pub mod types;
