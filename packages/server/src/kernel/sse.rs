//! Lightweight SSE bridge for streaming broadcast channels to clients.
//!
//! Translates a hub subscription into an SSE response. Client disconnects
//! drop the receiving end; the hub's heartbeat probe then evicts the
//! subscriber and releases its resources.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::broadcast::{channels, BroadcastHub};

/// Shared state for the SSE endpoints.
#[derive(Clone)]
pub struct SseState {
    pub hub: BroadcastHub,
}

/// Build the axum router for SSE endpoints.
pub fn router(state: SseState) -> Router {
    Router::new()
        .route("/api/streams/{channel}", get(stream_handler))
        .with_state(state)
}

/// SSE handler — connects a hub subscriber scoped to one channel and
/// forwards its messages.
async fn stream_handler(
    State(state): State<SseState>,
    Path(channel): Path<String>,
) -> Response {
    if !channels::is_known(&channel) {
        return (StatusCode::NOT_FOUND, "unknown channel").into_response();
    }

    let handle = state.hub.connect_with(&[channel.as_str()]).await;
    Sse::new(message_stream(handle.receiver))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn message_stream(
    receiver: tokio::sync::mpsc::Receiver<super::broadcast::BroadcastMessage>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    ReceiverStream::new(receiver).map(|message| {
        let event_type = match serde_json::to_value(message.message_type) {
            Ok(serde_json::Value::String(s)) => s,
            _ => "message".to_string(),
        };
        let data = serde_json::to_string(&message).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event(event_type).data(data))
    })
}
