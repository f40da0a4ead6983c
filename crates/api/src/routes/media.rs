//! Route definitions for media requests and artifact retrieval.
//!
//! Mounted by `api_routes()` at `/media`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::media;
use crate::state::AppState;
use crate::ws;

/// Media routes.
///
/// ```text
/// POST   /                          -> submit
/// GET    /ws                        -> media_ws_handler
/// GET    /{fingerprint}             -> list_artifacts
/// GET    /{fingerprint}/status      -> get_status
/// GET    /{fingerprint}/file        -> get_file
/// GET    /{fingerprint}/archive     -> get_archive
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(media::submit))
        .route("/ws", get(ws::media_ws_handler))
        .route("/{fingerprint}", get(media::list_artifacts))
        .route("/{fingerprint}/status", get(media::get_status))
        .route("/{fingerprint}/file", get(media::get_file))
        .route("/{fingerprint}/archive", get(media::get_archive))
}
