//! Long-poll GET/POST handlers (§4.A, §6). A GET without `sid` is the
//! handshake (scenario S1); a GET with `sid` is the long-poll receive. POST
//! is the long-poll send.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::error::ServerError;
use crate::state::AppState;

/// Headers worth threading into the `Handshake` record for middleware/CORS
/// decisions. The full header map is deliberately not retained.
const CARRIED_HEADERS: &[&str] = &["origin", "user-agent"];

fn carry_headers(headers: &HeaderMap) -> HashMap<String, String> {
    CARRIED_HEADERS
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| ((*name).to_owned(), v.to_owned()))
        })
        .collect()
}

pub async fn get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    match params.get("sid").cloned() {
        None => handshake(state, params, headers).await,
        Some(sid) => poll(state, sid).await,
    }
}

async fn handshake(state: AppState, params: HashMap<String, String>, headers: HeaderMap) -> Response {
    if state.sessions.at_capacity() {
        return ServerError::AtCapacity.into_response();
    }
    let header_map = carry_headers(&headers);
    let path = state.config.path.clone();
    let session = state.sessions.handshake(params, header_map, path);

    let Some(longpoll) = session.longpoll_transport() else {
        return ServerError::UnknownSession.into_response();
    };
    // The handshake already queued the OPEN packet; with a non-empty queue
    // `poll` drains and returns immediately rather than waiting out the
    // timeout.
    let timeout = state.sessions.adaptive_poll_timeout();
    let packets = longpoll.poll(timeout).await;
    let body = packets
        .first()
        .map(|p| match &p.payload {
            engineio_proto::Payload::Text(text) => text.clone(),
            engineio_proto::Payload::Binary(_) | engineio_proto::Payload::None => String::new(),
        })
        .unwrap_or_default();

    ([(axum::http::header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn poll(state: AppState, sid: String) -> Response {
    let Some(session) = state.sessions.get(&sid) else {
        return ServerError::UnknownSession.into_response();
    };
    let Some(longpoll) = session.longpoll_transport() else {
        // Already upgraded to WebSocket: nothing left to long-poll.
        return ServerError::UnknownSession.into_response();
    };
    let timeout = state.sessions.adaptive_poll_timeout();
    let packets = longpoll.poll(timeout).await;
    let body = engineio_proto::encode_payload(&packets);

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
        body,
    )
        .into_response()
}

pub async fn post(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if body.len() > state.config.max_packet_size {
        return ServerError::PacketTooLarge(body.len()).into_response();
    }
    let Some(sid) = params.get("sid") else {
        return ServerError::UnknownSession.into_response();
    };
    let Some(session) = state.sessions.get(sid) else {
        return ServerError::UnknownSession.into_response();
    };
    let text = match std::str::from_utf8(&body) {
        Ok(t) => t,
        Err(_) => return ServerError::InvalidFraming(engineio_proto::Error::InvalidFraming).into_response(),
    };
    let packets = match engineio_proto::decode_payload(text) {
        Ok(packets) => packets,
        Err(e) => {
            warn!(sid = %sid, error = %e, "invalid long-poll payload framing");
            return ServerError::InvalidFraming(e).into_response();
        }
    };
    for packet in packets {
        session.handle_incoming_packet(packet).await;
    }
    "ok".into_response()
}
