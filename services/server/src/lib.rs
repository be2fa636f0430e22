//! The socket.io server: an engine.io long-poll/WebSocket transport layer
//! underneath a Socket.IO namespace/room/ack layer, wired together behind a
//! small axum router (§6).

pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod http;
pub mod state;
pub mod transport;

pub use state::AppState;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

/// Builds the router for one `AppState` (§6). Route paths are derived from
/// `config.path`, mirroring how the engine.io/Socket.IO spec lets deployers
/// mount the protocol at a path other than the conventional `/socket.io/`.
pub fn build_router(state: AppState) -> Router {
    let path = state.config.path.clone();
    let trimmed = path.trim_end_matches('/');
    let ws_path = format!("{trimmed}/websocket/:sid");
    let admin_namespaces_path = format!("{trimmed}/admin/namespaces");
    let admin_rooms_path = format!("{trimmed}/admin/rooms/:nsp");
    let websocket_enabled = state.config.transports.iter().any(|t| t == "websocket");

    let mut router = Router::new().route(
        &path,
        get(http::polling::get)
            .post(http::polling::post)
            .options(http::cors::preflight),
    );
    // Only mount the upgrade route when `transports` actually enables it —
    // otherwise an operator who disabled websocket still has a live route
    // to upgrade onto (§6 `transports` config field).
    if websocket_enabled {
        router = router.route(&ws_path, get(http::websocket::upgrade));
    }

    router
        .route(&admin_namespaces_path, get(http::admin::list_namespaces))
        .route(&admin_rooms_path, get(http::admin::list_room_members))
        .fallback(fallback_404)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            http::cors::apply_cors,
        ))
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}
