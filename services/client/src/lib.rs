//! A Socket.IO client: transport selection, the engine.io handshake, the
//! reconnect state machine with exponential backoff and jitter, the
//! offline event queue, and the Socket.IO CONNECT/EVENT/ACK façade (§4.F).
//!
//! Mirrors `services/server`'s shape: a `config` module loaded from TOML,
//! a per-seam `error` type, and the protocol glue split across small
//! modules rather than one large file.

pub mod config;
pub mod engine;
pub mod error;
pub mod offline_queue;
pub mod reconnect;
pub mod socket;
pub mod transport;

pub use config::ClientConfig;
pub use error::ClientError;
pub use socket::Client;
