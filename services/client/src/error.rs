//! Client-local error type (§7), matching the teacher's per-seam
//! `thiserror` enums (`engineio_proto::Error`, `socketio_proto::Error`).

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("engine.io codec error: {0}")]
    Engine(#[from] engineio_proto::Error),
    #[error("socket.io codec error: {0}")]
    Protocol(#[from] socketio_proto::Error),
    #[error("namespace rejected by middleware: {0}")]
    ConnectRejected(String),
    #[error("not connected")]
    NotConnected,
    #[error("request timed out")]
    Timeout,
    #[error("disconnected")]
    Disconnected,
}
