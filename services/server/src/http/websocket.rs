//! WebSocket upgrade handler (§4.A/§4.B transport upgrade).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tracing::{debug, warn};

use crate::error::ServerError;
use crate::state::AppState;
use crate::transport::WebSocketTransport;

/// `GET <path>websocket/:sid` (§6): swaps the session onto a WebSocket
/// transport and then owns the read loop for its lifetime.
pub async fn upgrade(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(session) = state.sessions.get(&sid) else {
        return ServerError::UnknownSession.into_response();
    };

    ws.on_upgrade(move |socket| async move {
        let (sink, mut stream) = socket.split();
        let (transport, _sender_task) = WebSocketTransport::spawn(sink);
        session.upgrade(Arc::new(transport));

        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if let Some(packet) = session.decode_ws_frame(text.into_bytes(), false) {
                        session.handle_incoming_packet(packet).await;
                    }
                }
                Ok(Message::Binary(bytes)) => {
                    if let Some(packet) = session.decode_ws_frame(bytes, true) {
                        session.handle_incoming_packet(packet).await;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_) | Message::Pong(_)) => {}
                Err(e) => {
                    warn!(sid = %session.sid, error = %e, "websocket read error");
                    break;
                }
            }
        }
        debug!(sid = %session.sid, "websocket read loop ended");
        session.close("transport closed").await;
    })
}
