//! Shared batch heartbeat manager (§4.B): ticks at `pingInterval`, pinging
//! every live session in chunks of at most 100 with a yield between
//! chunks, grounded on the teacher's `heartbeat_interval` tick loop in
//! `ws_forwarder.rs`, generalized from one session to all of them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::session::EngineSession;

const CHUNK_SIZE: usize = 100;

pub struct HeartbeatManager {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatManager {
    pub fn start(
        interval: Duration,
        sessions_provider: impl Fn() -> Vec<Arc<EngineSession>> + Send + Sync + 'static,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let sessions = sessions_provider();
                for chunk in sessions.chunks(CHUNK_SIZE) {
                    for session in chunk {
                        if session.is_connected() {
                            session.send_ping();
                        }
                    }
                    tokio::task::yield_now().await;
                }
            }
        });
        Self {
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for HeartbeatManager {
    fn drop(&mut self) {
        self.stop();
    }
}
