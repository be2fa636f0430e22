use std::env;
use std::sync::Arc;
use std::time::Duration;

use server::config::{AdapterKind, ServerConfig};
use server::state::AppState;
use socketio_adapter::{Adapter, MemoryAdapter};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config_path = env::var("SOCKETIO_CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
    let config = match ServerConfig::load_from_path(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            info!(error = %e, path = %config_path, "no usable config file, falling back to defaults");
            ServerConfig::default()
        }
    };
    let config = Arc::new(config);

    let adapter: Arc<dyn Adapter> = match config.adapter.kind {
        AdapterKind::Memory => Arc::new(MemoryAdapter::new()),
        AdapterKind::Redis => {
            let settings = &config.adapter.redis;
            let redis_config = socketio_adapter::RedisAdapterConfig {
                url: settings.url.clone(),
                key_prefix: settings.key_prefix.clone(),
                heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs),
            };
            let adapter = socketio_adapter::RedisAdapter::connect(redis_config)
                .await
                .expect("failed to connect to redis adapter");
            Arc::new(adapter)
        }
        AdapterKind::Mongo => {
            let settings = &config.adapter.mongo;
            let mongo_config = socketio_adapter::MongoAdapterConfig {
                uri: settings.uri.clone(),
                database: settings.database.clone(),
                key_prefix: settings.key_prefix.clone(),
                heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs),
            };
            let adapter = socketio_adapter::MongoAdapter::connect(mongo_config)
                .await
                .expect("failed to connect to mongo adapter");
            Arc::new(adapter)
        }
    };

    let state = AppState::with_adapter(config.clone(), adapter);
    state.registry.start().await;

    let bind_addr = format!("{}:{}", config.host, config.port);
    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, path = %config.path, "socket.io server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    state.sessions.shutdown().await;
    state.registry.shutdown().await;
    info!("server shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
