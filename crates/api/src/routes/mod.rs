pub mod health;
pub mod media;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /media                                 submit (POST)
/// /media/ws                              WebSocket progress stream
/// /media/{fingerprint}                   list artifacts
/// /media/{fingerprint}/status            stored status
/// /media/{fingerprint}/file              one artifact (?index=N)
/// /media/{fingerprint}/archive           zip of all artifacts
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/media", media::router())
}
