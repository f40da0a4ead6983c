//! One WebSocket session observing a media job.
//!
//! On connect the session resolves the request and sends an initial
//! `status` message. It then forwards hub events for the fingerprint and,
//! every poll interval, re-reads the status store, sending a `status`
//! message only when the value changed. A terminal hub event ends the
//! session; a terminal polled status ends it one interval later, leaving
//! the hub time to deliver its own terminal event.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use mediaflow_core::artifacts::ArtifactRef;
use mediaflow_core::request::MediaRequest;
use mediaflow_core::status::JobStatus;
use mediaflow_core::types::Fingerprint;
use mediaflow_events::HubMessage;
use mediaflow_pipeline::Resolution;
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// `type` tag of status messages.
pub const MSG_TYPE_STATUS: &str = "status";
/// Reported when the store holds no entry for the fingerprint.
pub const STATUS_NOT_FOUND: &str = "not_found";

/// Sent on connect, when the job finished earlier, and on polled changes.
#[derive(Debug, Clone, Serialize)]
pub struct StatusMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub fingerprint: Fingerprint,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,
}

impl StatusMessage {
    fn new(fingerprint: &str, status: &'static str) -> Self {
        Self {
            kind: MSG_TYPE_STATUS,
            fingerprint: fingerprint.to_string(),
            status,
            message: None,
            artifacts: Vec::new(),
        }
    }

    /// Artifacts already exist.
    pub fn ready(fingerprint: &str, artifacts: Vec<ArtifactRef>) -> Self {
        Self {
            artifacts,
            ..Self::new(fingerprint, JobStatus::Completed.as_str())
        }
    }

    /// A job is running; `message` tells whether this session started it.
    pub fn processing(fingerprint: &str, message: &'static str) -> Self {
        Self {
            message: Some(message),
            ..Self::new(fingerprint, JobStatus::Processing.as_str())
        }
    }

    /// A status read from the store.
    pub fn polled(fingerprint: &str, status: Option<JobStatus>) -> Self {
        Self::new(fingerprint, status.map_or(STATUS_NOT_FOUND, JobStatus::as_str))
    }
}

/// Why a session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The job reached a terminal state.
    Finished,
    /// The client closed the socket or stopped reading.
    ClientGone,
    /// The server is shutting down; the close frame was already sent.
    ServerShutdown,
}

/// Drive one session until the job finishes or either side goes away.
///
/// Disconnecting never cancels the job; other observers keep receiving
/// its events.
pub async fn run_session(socket: WebSocket, state: AppState, request: MediaRequest) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();

    let (fingerprint, mut subscription, initial) = match state.orchestrator.resolve(&request).await
    {
        Resolution::Ready {
            fingerprint,
            artifacts,
        } => {
            tracing::debug!(conn_id = %conn_id, fingerprint = %fingerprint, "Artifacts ready, closing session");
            let _ = send_json(&mut sink, &StatusMessage::ready(&fingerprint, artifacts)).await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
        Resolution::Accepted {
            fingerprint,
            subscription,
        } => {
            let initial = StatusMessage::processing(&fingerprint, "starting");
            (fingerprint, subscription, initial)
        }
        Resolution::Attached {
            fingerprint,
            subscription,
        } => {
            let initial = StatusMessage::processing(&fingerprint, "already in progress");
            (fingerprint, subscription, initial)
        }
    };

    let mut control = state
        .ws_manager
        .add(conn_id.clone(), fingerprint.clone())
        .await;
    tracing::info!(conn_id = %conn_id, fingerprint = %fingerprint, "WebSocket session started");

    let mut poll =
        tokio::time::interval(Duration::from_secs(state.config.status_poll_interval_secs));
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    poll.tick().await;

    let mut last_status = Some(JobStatus::Processing);
    let mut terminal_polled = false;

    let end = if send_json(&mut sink, &initial).await.is_err() {
        SessionEnd::ClientGone
    } else {
        loop {
            tokio::select! {
                message = subscription.recv() => match message {
                    Some(HubMessage::Event(event)) => {
                        if send_json(&mut sink, &event).await.is_err() {
                            break SessionEnd::ClientGone;
                        }
                        if event.is_terminal() {
                            break SessionEnd::Finished;
                        }
                    }
                    Some(HubMessage::Close) | None => break SessionEnd::Finished,
                },
                _ = poll.tick() => {
                    if terminal_polled {
                        break SessionEnd::Finished;
                    }
                    match state.orchestrator.status(&fingerprint).await {
                        Ok(status) if status != last_status => {
                            last_status = status;
                            let message = StatusMessage::polled(&fingerprint, status);
                            if send_json(&mut sink, &message).await.is_err() {
                                break SessionEnd::ClientGone;
                            }
                            terminal_polled = status.is_some_and(JobStatus::is_terminal);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::debug!(fingerprint = %fingerprint, error = %e, "Status poll failed");
                        }
                    }
                },
                frame = control.recv() => match frame {
                    Some(Message::Close(frame)) => {
                        let _ = sink.send(Message::Close(frame)).await;
                        break SessionEnd::ServerShutdown;
                    }
                    Some(frame) => {
                        if sink.send(frame).await.is_err() {
                            break SessionEnd::ClientGone;
                        }
                    }
                    None => break SessionEnd::ServerShutdown,
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Close(_))) | None => break SessionEnd::ClientGone,
                    Some(Ok(Message::Pong(_))) => {
                        tracing::trace!(conn_id = %conn_id, "Pong received");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                        break SessionEnd::ClientGone;
                    }
                },
            }
        }
    };

    state
        .orchestrator
        .hub()
        .unregister(&subscription.handle)
        .await;
    state.ws_manager.remove(&conn_id).await;
    if end == SessionEnd::Finished {
        let _ = sink.send(Message::Close(None)).await;
    }
    tracing::info!(conn_id = %conn_id, fingerprint = %fingerprint, ?end, "WebSocket session ended");
}

/// Serialize `value` and send it as a text frame.
async fn send_json<S>(sink: &mut S, value: &impl Serialize) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WebSocket message");
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn processing_message_shape() {
        let value = serde_json::to_value(StatusMessage::processing("fp", "starting")).unwrap();
        assert_eq!(
            value,
            json!({"type": "status", "fingerprint": "fp", "status": "processing", "message": "starting"})
        );
    }

    #[test]
    fn ready_message_lists_artifacts() {
        let value = serde_json::to_value(StatusMessage::ready(
            "fp",
            vec![ArtifactRef::from_filename("1 - Song.mp3")],
        ))
        .unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["artifacts"][0]["index"], "1");
        assert_eq!(value["artifacts"][0]["title"], "Song");
        assert!(value.get("message").is_none());
    }

    #[test]
    fn polled_absent_is_not_found() {
        assert_eq!(StatusMessage::polled("fp", None).status, "not_found");
        assert_eq!(
            StatusMessage::polled("fp", Some(JobStatus::Error)).status,
            "error"
        );
    }
}
