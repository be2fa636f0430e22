//! `ServerConfig`, loaded from a TOML file the way the teacher's
//! `forwarder::config::load_config` loads its settings. Every field has a
//! default matching spec §6 so a minimal or missing config file still
//! produces a working server.

use std::fs;
use std::path::Path;

use serde::Deserialize;

fn default_host() -> String {
    "0.0.0.0".to_owned()
}
fn default_port() -> u16 {
    3000
}
fn default_path() -> String {
    "/socket.io/".to_owned()
}
fn default_ping_interval_ms() -> u64 {
    25_000
}
fn default_ping_timeout_ms() -> u64 {
    20_000
}
fn default_polling_timeout_ms() -> u64 {
    60_000
}
fn default_transports() -> Vec<String> {
    vec!["websocket".to_owned(), "polling".to_owned()]
}
fn default_true() -> bool {
    true
}
fn default_max_connections() -> usize {
    10_000
}
fn default_max_packet_size() -> usize {
    10 * 1024 * 1024
}
fn default_server_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsConfig {
    /// `["*"]` matches any origin. Otherwise the `Origin` header is echoed
    /// back only if it appears in this list.
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
    #[serde(default)]
    pub credentials: bool,
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_owned()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: default_cors_origins(),
            credentials: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    /// Base64-encoded key; length must match `algorithm` (16 or 32 bytes).
    pub key: String,
    pub algorithm: EncryptionAlgorithm,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    #[default]
    Memory,
    Redis,
    Mongo,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RedisAdapterSettings {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_owned()
}
fn default_key_prefix() -> String {
    "socket.io".to_owned()
}
fn default_heartbeat_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MongoAdapterSettings {
    #[serde(default = "default_mongo_uri")]
    pub uri: String,
    #[serde(default = "default_mongo_database")]
    pub database: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_mongo_uri() -> String {
    "mongodb://127.0.0.1:27017".to_owned()
}
fn default_mongo_database() -> String {
    "socketio".to_owned()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    #[serde(default)]
    pub kind: AdapterKind,
    #[serde(default)]
    pub redis: RedisAdapterSettings,
    #[serde(default)]
    pub mongo: MongoAdapterSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_server_id")]
    pub server_id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_polling_timeout_ms")]
    pub polling_timeout_ms: u64,
    #[serde(default = "default_transports")]
    pub transports: Vec<String>,
    #[serde(default = "default_true")]
    pub allow_polling: bool,
    #[serde(default = "default_true")]
    pub allow_cors: bool,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub compression: bool,
    #[serde(default)]
    pub encryption: Option<EncryptionConfig>,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_id: default_server_id(),
            host: default_host(),
            port: default_port(),
            path: default_path(),
            ping_interval_ms: default_ping_interval_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            polling_timeout_ms: default_polling_timeout_ms(),
            transports: default_transports(),
            allow_polling: default_true(),
            allow_cors: default_true(),
            cors: CorsConfig::default(),
            max_connections: default_max_connections(),
            compression: false,
            encryption: None,
            adapter: AdapterConfig::default(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

impl ServerConfig {
    /// Loads a config from a TOML file on disk. A missing file is not an
    /// error at the call site the binary uses (`main.rs` falls back to
    /// `ServerConfig::default()` and logs); this function itself fails loud
    /// when asked for a path that does not parse.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Read(path.as_ref().display().to_string(), e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
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
        let cfg = ServerConfig::default();
        assert_eq!(cfg.path, "/socket.io/");
        assert_eq!(cfg.ping_interval_ms, 25_000);
        assert_eq!(cfg.ping_timeout_ms, 20_000);
        assert_eq!(cfg.polling_timeout_ms, 60_000);
        assert_eq!(cfg.transports, vec!["websocket", "polling"]);
        assert!(cfg.allow_polling);
        assert!(cfg.allow_cors);
        assert_eq!(cfg.max_packet_size, 10 * 1024 * 1024);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let cfg: ServerConfig = toml::from_str("port = 4000\n").unwrap();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.ping_interval_ms, 25_000);
    }
}
