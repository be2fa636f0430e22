//! A small demo client: connects to a server, logs lifecycle events, and
//! echoes whatever the server sends on `"message"` back on `"message"`.
//! Not part of the protocol core — a runnable demonstration, the way the
//! teacher ships `services/emulator` alongside its library crates.

use std::env;
use std::sync::Arc;

use client::config::ClientConfig;
use client::socket::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config_path = env::var("SOCKETIO_CLIENT_CONFIG").unwrap_or_else(|_| "client.toml".to_owned());
    let config = match ClientConfig::load_from_path(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            info!(error = %e, path = %config_path, "no usable client config, falling back to defaults");
            ClientConfig::default()
        }
    };

    let client = Client::new(config);

    client
        .on_connect(Arc::new(|| info!("connected")))
        .await;
    client
        .on_disconnect(Arc::new(|reason| info!(reason, "disconnected")))
        .await;
    client
        .on_connect_error(Arc::new(|message| info!(message, "connect error")))
        .await;
    client
        .on_reconnecting(Arc::new(|attempt| info!(attempt, "reconnecting")))
        .await;
    client
        .on_reconnect_failed(Arc::new(|| info!("reconnect failed, giving up")))
        .await;

    let echo_client = Arc::clone(&client);
    client
        .on(
            "message",
            Arc::new(move |data, _reply| {
                let echo_client = Arc::clone(&echo_client);
                tokio::spawn(async move {
                    echo_client.emit("message", data).await;
                });
            }),
        )
        .await;

    client.connect().await;

    tokio::signal::ctrl_c().await.expect("ctrl-c handler");
    client.disconnect().await;
}
