use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use mediaflow_core::request::{MediaRequest, MediaRequestParams};

use crate::error::AppResult;
use crate::state::AppState;
use crate::ws::session;

/// GET /api/v1/media/ws?url=&format=&quality=&playlist=&index=
///
/// Validates the request before upgrading, so malformed parameters get a
/// plain `400` JSON error instead of a socket. After the upgrade the
/// session resolves the job and streams its progress.
pub async fn media_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<MediaRequestParams>,
) -> AppResult<Response> {
    let request = MediaRequest::from_params(params, &state.config.default_format)?;
    Ok(ws
        .on_upgrade(move |socket| session::run_session(socket, state, request))
        .into_response())
}
