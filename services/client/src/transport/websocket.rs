//! WebSocket transport, client side (§4.A). Opened after the long-poll
//! handshake has assigned an `sid`: `GET <path>websocket/<sid>?sid=<sid>`
//! with a protocol upgrade, matching `http::websocket::upgrade` on the
//! server side.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::PacketSender;
use crate::error::ClientError;
use engineio_proto::Packet;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

pub struct WebSocketTransport {
    write: Mutex<WsWriter>,
    cancel_tx: watch::Sender<bool>,
}

impl WebSocketTransport {
    pub async fn connect(
        base_url: &str,
        sid: &str,
        sender: PacketSender,
    ) -> Result<Self, ClientError> {
        let ws_url = websocket_url(base_url, sid)?;
        let (ws, _response) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (write, mut read) = ws.split();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => return,
                    msg = read.next() => msg,
                };
                match next {
                    Some(Ok(Message::Text(text))) => match engineio_proto::decode(&text) {
                        Ok(packet) => {
                            let is_close =
                                matches!(packet.packet_type, engineio_proto::PacketType::Close);
                            if sender.send(packet).is_err() {
                                return;
                            }
                            if is_close {
                                return;
                            }
                        }
                        Err(_) => continue,
                    },
                    Some(Ok(Message::Binary(bytes))) => {
                        // Engine.IO frames binary WS messages without the
                        // leading type digit used by the text framing;
                        // decode as a MESSAGE packet carrying the bytes.
                        let packet =
                            Packet::new(engineio_proto::PacketType::Message, engineio_proto::Payload::Binary(bytes.into()));
                        if sender.send(packet).is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => return,
                }
            }
        });

        Ok(Self {
            write: Mutex::new(write),
            cancel_tx,
        })
    }

    pub async fn send(&self, packet: Packet) -> Result<(), ClientError> {
        let text = engineio_proto::encode(&packet);
        let mut write = self.write.lock().await;
        write
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    pub async fn close(&self) {
        let _ = self.cancel_tx.send(true);
        let mut write = self.write.lock().await;
        let _ = write.send(Message::Close(None)).await;
    }
}

fn websocket_url(base_url: &str, sid: &str) -> Result<String, ClientError> {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(ClientError::Handshake(format!(
            "unsupported url scheme in '{base_url}'"
        )));
    };
    let trimmed = ws_base.trim_end_matches('/');
    Ok(format!("{trimmed}/websocket/{sid}?sid={sid}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_rewrites_scheme_and_appends_sid_path() {
        let url = websocket_url("http://127.0.0.1:3000/socket.io/", "abc123").unwrap();
        assert_eq!(
            url,
            "ws://127.0.0.1:3000/socket.io/websocket/abc123?sid=abc123"
        );
    }

    #[test]
    fn websocket_url_preserves_tls_scheme() {
        let url = websocket_url("https://example.com/socket.io/", "xyz").unwrap();
        assert_eq!(url, "wss://example.com/socket.io/websocket/xyz?sid=xyz");
    }
}
