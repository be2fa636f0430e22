//! One variant per failure kind named in §7, plus an `IntoResponse` impl so
//! the HTTP layer can turn any of them into the right status code without a
//! `match` at every call site.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("unknown session")]
    UnknownSession,
    #[error("invalid framing: {0}")]
    InvalidFraming(#[from] engineio_proto::Error),
    #[error("decryption failed")]
    DecryptionError,
    #[error("encryption failed")]
    EncryptionError,
    #[error("packet too large: {0} bytes")]
    PacketTooLarge(usize),
    #[error("server is at capacity")]
    AtCapacity,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match self {
            ServerError::UnknownSession => StatusCode::NOT_FOUND,
            ServerError::InvalidFraming(_) => StatusCode::BAD_REQUEST,
            ServerError::DecryptionError => StatusCode::BAD_REQUEST,
            ServerError::EncryptionError => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::PacketTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::AtCapacity => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, self.to_string()).into_response()
    }
}
