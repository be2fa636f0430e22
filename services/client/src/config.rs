//! `ClientConfig`, loaded from a TOML file the way `server::config::ServerConfig`
//! loads its settings (§6). Defaults match spec §4.F and the `io()` client
//! defaults it generalizes from.

use std::fs;
use std::path::Path;

use serde::Deserialize;

fn default_url() -> String {
    "http://127.0.0.1:3000".to_owned()
}
fn default_path() -> String {
    "/socket.io/".to_owned()
}
fn default_namespace() -> String {
    "/".to_owned()
}
fn default_transports() -> Vec<String> {
    vec!["websocket".to_owned(), "polling".to_owned()]
}
fn default_true() -> bool {
    true
}
fn default_reconnection_delay_ms() -> u64 {
    1000
}
fn default_reconnection_delay_max_ms() -> u64 {
    30_000
}
fn default_timeout_ms() -> u64 {
    20_000
}
fn default_queue_capacity() -> usize {
    1000
}
fn default_queue_max_age_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `http://127.0.0.1:3000`.
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Transport rotation order (§4.F). Only `"websocket"` and `"polling"`
    /// are recognized; unknown entries are ignored at construction time.
    #[serde(default = "default_transports")]
    pub transports: Vec<String>,
    #[serde(default = "default_true")]
    pub reconnection: bool,
    #[serde(default = "default_reconnection_delay_ms")]
    pub reconnection_delay_ms: u64,
    #[serde(default = "default_reconnection_delay_max_ms")]
    pub reconnection_delay_max_ms: u64,
    /// Cap on consecutive reconnect attempts before `"reconnect_failed"`
    /// fires and the client gives up. `None` retries forever, matching
    /// spec §4.F which never mentions a giving-up condition other than the
    /// >10-consecutive-errors cooldown.
    #[serde(default)]
    pub reconnection_attempts: Option<u32>,
    /// Socket.IO CONNECT handshake timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub offline_queue_capacity: usize,
    #[serde(default = "default_queue_max_age_secs")]
    pub offline_queue_max_age_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            path: default_path(),
            namespace: default_namespace(),
            transports: default_transports(),
            reconnection: default_true(),
            reconnection_delay_ms: default_reconnection_delay_ms(),
            reconnection_delay_max_ms: default_reconnection_delay_max_ms(),
            reconnection_attempts: None,
            timeout_ms: default_timeout_ms(),
            offline_queue_capacity: default_queue_capacity(),
            offline_queue_max_age_secs: default_queue_max_age_secs(),
        }
    }
}

impl ClientConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Read(path.as_ref().display().to_string(), e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// `<url><path>`, e.g. `http://127.0.0.1:3000/socket.io/` — the base
    /// the engine.io transports append their own query strings to.
    pub fn engine_base_url(&self) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), self.path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(String, String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.transports, vec!["websocket", "polling"]);
        assert!(cfg.reconnection);
        assert_eq!(cfg.reconnection_delay_ms, 1000);
        assert_eq!(cfg.reconnection_delay_max_ms, 30_000);
        assert_eq!(cfg.offline_queue_capacity, 1000);
        assert_eq!(cfg.offline_queue_max_age_secs, 60);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: ClientConfig = toml::from_str("url = \"http://example.com:9000\"\n").unwrap();
        assert_eq!(cfg.url, "http://example.com:9000");
        assert_eq!(cfg.namespace, "/");
        assert_eq!(cfg.offline_queue_capacity, 1000);
    }

    #[test]
    fn engine_base_url_joins_url_and_path() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.engine_base_url(), "http://127.0.0.1:3000/socket.io/");
    }
}
