//! Echoes the `Origin` header back when it satisfies the configured CORS
//! policy (§6). A small middleware function rather than
//! `tower_http::cors::CorsLayer`, since the policy is driven by the
//! runtime `CorsConfig` record loaded from `ServerConfig`, not a
//! builder-configured layer fixed at startup.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::CorsConfig;
use crate::state::AppState;

fn echoed_origin(cors: &CorsConfig, origin: Option<&str>) -> Option<HeaderValue> {
    let origin = origin?;
    let allowed = cors.origins.iter().any(|o| o == "*" || o == origin);
    if !allowed {
        return None;
    }
    HeaderValue::from_str(origin).ok()
}

pub async fn apply_cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut response = next.run(request).await;
    if let Some(value) = echoed_origin(&state.config.cors, origin.as_deref()) {
        response
            .headers_mut()
            .insert(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        if state.config.cors.credentials {
            response.headers_mut().insert(
                axum::http::header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }
    response
}

/// `OPTIONS <path>…` preflight (§6): a bare 204 carrying the same echoed
/// origin plus the methods/headers the real request will use.
pub async fn preflight(State(state): State<AppState>, request: Request) -> Response {
    let origin = request
        .headers()
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Some(value) = echoed_origin(&state.config.cors, origin.as_deref()) {
        let headers = response.headers_mut();
        headers.insert(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            axum::http::header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        );
        headers.insert(
            axum::http::header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("content-type"),
        );
        if state.config.cors.credentials {
            headers.insert(
                axum::http::header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }
    response
}
