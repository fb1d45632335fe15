//! Upgrade endpoint
//!
//! Converts the axum socket into a [`WireFrame`] stream/sink pair and hands
//! it to the gateway, which owns the session from then on.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::Extension;
use futures_util::{future, SinkExt, StreamExt};
use sluice_gateway::{Gateway, WireFrame};

use crate::middleware::AuthenticatedIdentity;
use crate::state::AppState;

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    identity: Option<Extension<AuthenticatedIdentity>>,
) -> Response {
    let limit = state.gateway.keepalive().max_frame_bytes;
    let gateway = state.gateway.clone();
    let identity = identity.map(|Extension(id)| id.user_id);

    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| run_session(gateway, identity, socket))
}

async fn run_session(gateway: Gateway, identity: Option<String>, socket: WebSocket) {
    let (sink, stream) = socket.split();
    let inbound = stream.map(|message| message.map(into_wire));
    let outbound =
        sink.with(|frame: WireFrame| future::ready(Ok::<_, axum::Error>(from_wire(frame))));

    match gateway.accept(identity, inbound, outbound).await {
        Ok(tasks) => tracing::debug!(session_id = %tasks.id, "session pumps started"),
        Err(e) => tracing::warn!(error = %e, "failed to accept session"),
    }
}

fn into_wire(message: Message) -> WireFrame {
    match message {
        Message::Text(text) => WireFrame::Text(text),
        Message::Binary(bytes) => WireFrame::Binary(bytes),
        Message::Ping(bytes) => WireFrame::Ping(bytes),
        Message::Pong(bytes) => WireFrame::Pong(bytes),
        Message::Close(_) => WireFrame::Close,
    }
}

fn from_wire(frame: WireFrame) -> Message {
    match frame {
        WireFrame::Text(text) => Message::Text(text),
        WireFrame::Binary(bytes) => Message::Binary(bytes),
        WireFrame::Ping(bytes) => Message::Ping(bytes),
        WireFrame::Pong(bytes) => Message::Pong(bytes),
        WireFrame::Close => Message::Close(None),
    }
}
