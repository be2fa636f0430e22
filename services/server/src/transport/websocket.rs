//! Server-side WebSocket transport: a small batch sender that drains up to
//! `BATCH_SIZE` queued frames and yields the scheduler between batches, so
//! one chatty connection cannot starve the others (§5 batch yielding).

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const BATCH_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum WsTransportError {
    #[error("websocket transport is closed")]
    Closed,
}

/// Teardown is Drop-driven: the session holds the only `Arc` to this
/// transport, so dropping it (on upgrade-away or session close) closes the
/// `outgoing` channel, which makes the batch-sender task's `recv()` return
/// `None` and send the final Close frame itself.
pub struct WebSocketTransport {
    outgoing: mpsc::UnboundedSender<Message>,
}

impl WebSocketTransport {
    pub fn spawn(mut sink: SplitSink<WebSocket, Message>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let handle = tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                let mut batch = vec![first];
                while batch.len() < BATCH_SIZE {
                    match rx.try_recv() {
                        Ok(frame) => batch.push(frame),
                        Err(_) => break,
                    }
                }
                for frame in batch {
                    if sink.send(frame).await.is_err() {
                        debug!("websocket send failed, stopping batch sender");
                        return;
                    }
                }
                tokio::task::yield_now().await;
            }
            let _ = sink.send(Message::Close(None)).await;
        });
        (Self { outgoing: tx }, handle)
    }

    pub fn send_text(&self, text: String) -> Result<(), WsTransportError> {
        self.outgoing
            .send(Message::Text(text))
            .map_err(|_| WsTransportError::Closed)
    }

    pub fn send_binary(&self, bytes: Vec<u8>) -> Result<(), WsTransportError> {
        self.outgoing
            .send(Message::Binary(bytes))
            .map_err(|_| WsTransportError::Closed)
    }
}
