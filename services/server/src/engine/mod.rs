//! Engine.IO session layer (§4.B): handshake, heartbeat, upgrade, close,
//! and the bridge into the Socket.IO namespace/socket layer.

mod dispatch;
mod heartbeat;
mod manager;
mod session;

pub use manager::EngineSessionManager;
pub use session::EngineSession;
