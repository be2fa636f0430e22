//! End-to-end scenarios driving a real [`client::Client`] against a real
//! `server::AppState` router bound to an ephemeral port, in the same style
//! as `services/server/tests/scenarios.rs`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use client::config::ClientConfig;
use client::socket::Client;
use serde_json::json;
use server::config::ServerConfig;
use server::state::AppState;

async fn spawn_server() -> (String, AppState) {
    let config = Arc::new(ServerConfig::default());
    let state = AppState::new(config);
    state.registry.start().await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server::build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn client_config(url: &str) -> ClientConfig {
    ClientConfig {
        url: url.to_owned(),
        transports: vec!["polling".to_owned()],
        ..ClientConfig::default()
    }
}

/// A client completes the Engine.IO handshake and the Socket.IO CONNECT
/// round-trip, firing `"connect"` exactly once.
#[tokio::test]
async fn client_connects_and_fires_connect_once() {
    let (url, _state) = spawn_server().await;
    let client = Client::new(client_config(&url));

    let connect_count = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&connect_count);
    client
        .on_connect(Arc::new(move || {
            flag.store(true, Ordering::SeqCst);
        }))
        .await;

    client.connect().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(connect_count.load(Ordering::SeqCst));
    assert_eq!(
        client.connection_state().await,
        client::reconnect::ConnectionState::Connected
    );

    client.disconnect().await;
}

/// A server-side `"hi"` handler that replies with an ack is observed by
/// the client's `emit_with_ack` callback (§8 property 3).
#[tokio::test]
async fn ack_round_trips_to_the_client_callback() {
    let (url, state) = spawn_server().await;
    state.registry.of("/").on_connection(Arc::new(|socket| {
        socket.on(
            "hi",
            Arc::new(|arg, reply| {
                let n = arg.and_then(|v| v.as_i64()).unwrap_or(0);
                if let Some(reply) = reply {
                    reply.send(Some(json!(n + 1)));
                }
            }),
        );
    }));

    let client = Client::new(client_config(&url));
    client.connect().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (tx, rx) = tokio::sync::oneshot::channel();
    client
        .emit_with_ack("hi", Some(json!(41)), Box::new(move |reply| {
            let _ = tx.send(reply);
        }))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("ack did not arrive in time")
        .unwrap();
    assert_eq!(reply, Some(json!(42)));

    client.disconnect().await;
}

/// Events emitted while the client has not yet connected are queued
/// offline and delivered once the connection is established (§8 property
/// 8, "offline flush").
#[tokio::test]
async fn events_emitted_before_connect_flush_on_connect() {
    let (url, state) = spawn_server().await;
    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let received_clone = Arc::clone(&received);
    state.registry.of("/").on_connection(Arc::new(move |socket| {
        let received = Arc::clone(&received_clone);
        socket.on(
            "queued",
            Arc::new(move |arg, _reply| {
                received.lock().unwrap().push(arg);
            }),
        );
    }));

    let client = Client::new(client_config(&url));
    // Not connected yet: these three go straight to the offline queue.
    client.emit("queued", Some(json!(1))).await;
    client.emit("queued", Some(json!(2))).await;
    client.emit("queued", Some(json!(3))).await;

    client.connect().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let got = received.lock().unwrap().clone();
    assert_eq!(got, vec![Some(json!(1)), Some(json!(2)), Some(json!(3))]);

    client.disconnect().await;
}

/// A user-initiated `disconnect()` does not trigger a reconnect attempt.
#[tokio::test]
async fn intentional_disconnect_does_not_reconnect() {
    let (url, _state) = spawn_server().await;
    let client = Client::new(client_config(&url));
    client.connect().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        client.connection_state().await,
        client::reconnect::ConnectionState::Connected
    );

    client.disconnect().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        client.connection_state().await,
        client::reconnect::ConnectionState::Offline
    );
}
