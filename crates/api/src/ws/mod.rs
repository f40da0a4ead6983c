//! WebSocket infrastructure for live job progress.
//!
//! Provides session tracking, heartbeat monitoring, and the HTTP upgrade
//! handler streaming a media job's progress to the client.

mod handler;
mod heartbeat;
pub mod manager;
pub mod session;

pub use handler::media_ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
