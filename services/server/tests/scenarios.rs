//! End-to-end scenarios driven over real HTTP against a server bound to an
//! ephemeral port, in the style of the teacher's `tests/http_reads.rs`
//! (a real `TcpListener` + `axum::serve` + an HTTP client), but with
//! `reqwest` standing in for the client side of the wire protocol.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use server::config::ServerConfig;
use server::state::AppState;

async fn spawn_server() -> (SocketAddr, AppState) {
    let config = Arc::new(ServerConfig::default());
    let state = AppState::new(config);
    state.registry.start().await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server::build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, state)
}

async fn handshake(client: &reqwest::Client, addr: SocketAddr) -> String {
    let body: serde_json::Value = client
        .get(format!("http://{addr}/socket.io/?transport=polling"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["sid"].as_str().unwrap().to_owned()
}

/// S1: `GET /socket.io/?transport=polling` returns the handshake JSON
/// directly (no Engine.IO payload framing on this one response).
#[tokio::test]
async fn s1_handshake_returns_sid_and_timing() {
    let (addr, _state) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/socket.io/?transport=polling"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(!body["sid"].as_str().unwrap().is_empty());
    assert_eq!(body["upgrades"], json!(["websocket"]));
    assert_eq!(body["pingInterval"], json!(25_000));
    assert_eq!(body["pingTimeout"], json!(20_000));
}

/// S2: posting a CONNECT packet admits the socket; server answers "ok" on
/// the POST and the next GET carries the CONNECT ack back.
#[tokio::test]
async fn s2_connect_event_round_trips() {
    let (addr, _state) = spawn_server().await;
    let client = reqwest::Client::new();
    let sid = handshake(&client, addr).await;

    let post = client
        .post(format!("http://{addr}/socket.io/?sid={sid}"))
        .body("2:40")
        .send()
        .await
        .unwrap();
    assert_eq!(post.status(), 200);
    assert_eq!(post.text().await.unwrap(), "ok");

    let poll = client
        .get(format!("http://{addr}/socket.io/?sid={sid}&transport=polling"))
        .send()
        .await
        .unwrap();
    assert_eq!(poll.status(), 200);
    let payload = poll.text().await.unwrap();
    assert!(payload.contains(":40"));
}

/// S3: a registered `"hi"` handler that replies on `"bye"` is observed by
/// the next long-poll GET.
#[tokio::test]
async fn s3_named_event_triggers_registered_handler() {
    let (addr, state) = spawn_server().await;
    state.registry.of("/").on_connection(Arc::new(|socket| {
        let reply_socket = socket.clone();
        socket.on(
            "hi",
            Arc::new(move |arg, _reply| {
                let n = arg.and_then(|v| v.as_i64()).unwrap_or(0);
                reply_socket.emit("bye", Some(json!(n + 1)), None);
            }),
        );
    }));

    let client = reqwest::Client::new();
    let sid = handshake(&client, addr).await;
    client
        .post(format!("http://{addr}/socket.io/?sid={sid}"))
        .body("2:40")
        .send()
        .await
        .unwrap();
    client
        .get(format!("http://{addr}/socket.io/?sid={sid}&transport=polling"))
        .send()
        .await
        .unwrap();

    client
        .post(format!("http://{addr}/socket.io/?sid={sid}"))
        .body(r#"10:42["hi",1]"#)
        .send()
        .await
        .unwrap();

    let poll = client
        .get(format!("http://{addr}/socket.io/?sid={sid}&transport=polling"))
        .send()
        .await
        .unwrap();
    let payload = poll.text().await.unwrap();
    assert!(payload.contains(r#"["bye",2]"#));
}

/// S4: an EVENT with an ack id gets its ack delivered back over the next
/// GET as an ACK packet carrying the reply data.
#[tokio::test]
async fn s4_ack_round_trips_reply_data() {
    let (addr, state) = spawn_server().await;
    state.registry.of("/").on_connection(Arc::new(|socket| {
        socket.on(
            "q",
            Arc::new(|_arg, reply| {
                if let Some(reply) = reply {
                    reply.send(Some(json!(42)));
                }
            }),
        );
    }));

    let client = reqwest::Client::new();
    let sid = handshake(&client, addr).await;
    client
        .post(format!("http://{addr}/socket.io/?sid={sid}"))
        .body("2:40")
        .send()
        .await
        .unwrap();
    client
        .get(format!("http://{addr}/socket.io/?sid={sid}&transport=polling"))
        .send()
        .await
        .unwrap();

    client
        .post(format!("http://{addr}/socket.io/?sid={sid}"))
        .body(r#"10:421["q",0]"#)
        .send()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let poll = client
        .get(format!("http://{addr}/socket.io/?sid={sid}&transport=polling"))
        .send()
        .await
        .unwrap();
    let payload = poll.text().await.unwrap();
    assert!(payload.contains("431[42]"));
}

/// S5: a broadcast to a room reaches the other room member and not the
/// sender.
#[tokio::test]
async fn s5_room_broadcast_excludes_sender() {
    let (addr, state) = spawn_server().await;
    state.registry.of("/").on_connection(Arc::new(|socket| {
        let joiner = socket.clone();
        tokio::spawn(async move {
            joiner.join("r").await;
        });
        socket.on(
            "go",
            Arc::new(|_arg, _reply| {}),
        );
    }));

    let client = reqwest::Client::new();
    let sid_a = handshake(&client, addr).await;
    let sid_b = handshake(&client, addr).await;
    for sid in [&sid_a, &sid_b] {
        client
            .post(format!("http://{addr}/socket.io/?sid={sid}"))
            .body("2:40")
            .send()
            .await
            .unwrap();
        client
            .get(format!("http://{addr}/socket.io/?sid={sid}&transport=polling"))
            .send()
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let ns = state.registry.of("/");
    let sockets = ns.sockets();
    let sender = sockets.first().unwrap().clone();
    sender.to("r").emit("m", Some(json!(1))).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let poll_a = client
        .get(format!("http://{addr}/socket.io/?sid={sid_a}&transport=polling"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let poll_b = client
        .get(format!("http://{addr}/socket.io/?sid={sid_b}&transport=polling"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let says_m = |body: &str| body.contains(r#"["m",1]"#);
    assert_ne!(says_m(&poll_a), says_m(&poll_b));
}
