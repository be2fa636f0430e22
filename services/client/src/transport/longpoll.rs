//! Long-poll transport, client side (§4.A). Performs the initial GET
//! handshake to learn `sid`, then loops GET (receive) with a 30s
//! per-request timeout and a 50ms quiet interval between successful polls;
//! sends go out as individual POSTs.

use std::time::Duration;

use tokio::sync::watch;

use super::{HandshakeInfo, PacketSender};
use crate::error::ClientError;
use engineio_proto::Packet;

const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const QUIET_INTERVAL: Duration = Duration::from_millis(50);

pub struct LongPollTransport {
    client: reqwest::Client,
    base_url: String,
    sid: String,
    cancel_tx: watch::Sender<bool>,
}

impl LongPollTransport {
    /// `GET <base_url>?transport=polling` — the handshake. The response
    /// body is the bare handshake JSON (no Engine.IO payload framing on
    /// this one response, matching `http::polling::handshake` on the
    /// server side).
    pub async fn handshake(base_url: &str) -> Result<(Self, HandshakeInfo), ClientError> {
        let client = reqwest::Client::new();
        let url = format!("{base_url}?transport=polling");
        let resp = client
            .get(&url)
            .timeout(POLL_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClientError::Handshake(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::Handshake(format!(
                "handshake returned status {}",
                resp.status()
            )));
        }
        let info: HandshakeInfo = resp
            .json()
            .await
            .map_err(|e| ClientError::Handshake(e.to_string()))?;
        let (cancel_tx, _) = watch::channel(false);
        let sid = info.sid.clone();
        Ok((
            Self {
                client,
                base_url: base_url.to_owned(),
                sid,
                cancel_tx,
            },
            info,
        ))
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Spawn the background GET-receive loop, decoding each response
    /// payload and forwarding packets onto `sender`. Returns once a CLOSE
    /// packet is observed, the connection is cancelled via `close`, or a
    /// request fails (the reconnection state machine picks up from there).
    pub fn start(&self, sender: PacketSender) {
        let client = self.client.clone();
        let url = format!("{}?sid={}&transport=polling", self.base_url, self.sid);
        let mut cancel_rx = self.cancel_tx.subscribe();
        tokio::spawn(async move {
            loop {
                if *cancel_rx.borrow() {
                    return;
                }
                let request = client.get(&url).timeout(POLL_TIMEOUT).send();
                let response = tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => return,
                    result = request => result,
                };
                match response {
                    Ok(resp) if resp.status().is_success() => match resp.text().await {
                        Ok(text) => match engineio_proto::decode_payload(&text) {
                            Ok(packets) => {
                                let mut saw_close = false;
                                for packet in packets {
                                    saw_close |= matches!(
                                        packet.packet_type,
                                        engineio_proto::PacketType::Close
                                    );
                                    if sender.send(packet).is_err() {
                                        return;
                                    }
                                }
                                if saw_close {
                                    return;
                                }
                            }
                            Err(_) => return,
                        },
                        Err(_) => return,
                    },
                    _ => return,
                }
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => return,
                    () = tokio::time::sleep(QUIET_INTERVAL) => {}
                }
            }
        });
    }

    /// `POST <base_url>?sid=<sid>` carrying one payload-framed packet.
    pub async fn send(&self, packet: Packet) -> Result<(), ClientError> {
        let url = format!("{}?sid={}", self.base_url, self.sid);
        let body = engineio_proto::encode_payload(std::slice::from_ref(&packet));
        let resp = self
            .client
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ClientError::Transport(format!(
                "post returned status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Cancels the in-flight/next GET without logging it as an error
    /// (§4.F "a cancelled fetch does not log an error").
    pub fn close(&self) {
        let _ = self.cancel_tx.send(true);
    }
}
