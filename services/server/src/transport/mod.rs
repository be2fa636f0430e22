pub mod longpoll;
pub mod websocket;

pub use longpoll::LongPollTransport;
pub use websocket::{WebSocketTransport, WsTransportError};
