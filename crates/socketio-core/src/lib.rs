//! Namespace multiplexing, rooms, ack registry, middleware chain, and
//! broadcast operators (§4.D). Sits on top of `socketio-proto`'s codec and
//! `socketio-adapter`'s cross-process room index.

mod broadcast;
mod handshake;
mod namespace;
mod socket;

pub use broadcast::BroadcastBuilder;
pub use handshake::Handshake;
pub use namespace::{BoxFuture, ConnectionHandler, MiddlewareFn, Namespace, NamespaceRegistry};
pub use socket::{AckCallback, DisconnectHandler, EventHandler, OutgoingSender, Reply, Socket};
