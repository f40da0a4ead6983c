//! Request handlers.
//!
//! Handlers delegate to the orchestrator and media library in
//! `mediaflow_pipeline` and map errors via [`AppError`](crate::error::AppError).

pub mod media;
