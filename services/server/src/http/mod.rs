//! HTTP surface (§6): long-polling handshake/receive/send, the WebSocket
//! upgrade, CORS, and the admin introspection endpoints.

pub mod admin;
pub mod cors;
pub mod polling;
pub mod websocket;
