//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts against a local relay
//! with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use tether_session::IceServer;
use tether_shared::constants::{
    DEFAULT_DOWNLOADS_DIR, DEFAULT_RELAY_URL, DEFAULT_STUN_URL, FILE_CHUNK_DELAY_MS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the signaling relay.
    /// Env: `TETHER_RELAY_URL`
    /// Default: `ws://127.0.0.1:3000/ws`
    pub relay_url: String,

    /// STUN/TURN servers handed to the WebRTC stack.
    /// Env: `TETHER_ICE_URLS` (comma separated), `TETHER_TURN_USERNAME`,
    /// `TETHER_TURN_CREDENTIAL`. Credentials apply to `turn:`/`turns:` URLs.
    /// Default: one public STUN server.
    pub ice_servers: Vec<IceServer>,

    /// SQLite database file.
    /// Env: `TETHER_DB_PATH`
    /// Default: `None`, meaning the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Where received files are written.
    /// Env: `TETHER_DOWNLOADS_DIR`
    /// Default: `./downloads`
    pub downloads_dir: PathBuf,

    /// Pause between outgoing file chunks.
    /// Env: `TETHER_CHUNK_DELAY_MS`
    /// Default: 50 ms
    pub chunk_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            ice_servers: vec![IceServer::stun(DEFAULT_STUN_URL)],
            db_path: None,
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            chunk_delay: Duration::from_millis(FILE_CHUNK_DELAY_MS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = var("TETHER_RELAY_URL") {
            match Url::parse(&raw) {
                Ok(url) if matches!(url.scheme(), "ws" | "wss") => config.relay_url = raw,
                _ => {
                    tracing::warn!(value = %raw, "Invalid TETHER_RELAY_URL, using default");
                }
            }
        }

        if let Some(raw) = var("TETHER_ICE_URLS") {
            let urls: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
            if urls.is_empty() {
                tracing::warn!("TETHER_ICE_URLS is empty, using default");
            } else {
                config.ice_servers = ice_servers(
                    urls,
                    var("TETHER_TURN_USERNAME"),
                    var("TETHER_TURN_CREDENTIAL"),
                );
            }
        }

        if let Some(path) = var("TETHER_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(path) = var("TETHER_DOWNLOADS_DIR") {
            config.downloads_dir = PathBuf::from(path);
        }

        if let Some(val) = var("TETHER_CHUNK_DELAY_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.chunk_delay = Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid TETHER_CHUNK_DELAY_MS, using default");
                }
            }
        }

        // RUST_LOG is read by tracing-subscriber directly.

        config
    }
}

/// Split STUN from TURN entries; only TURN carries credentials.
fn ice_servers(
    urls: Vec<String>,
    username: Option<String>,
    credential: Option<String>,
) -> Vec<IceServer> {
    let (turn, stun): (Vec<String>, Vec<String>) = urls
        .into_iter()
        .partition(|u| u.starts_with("turn:") || u.starts_with("turns:"));

    let mut servers = Vec::new();
    if !stun.is_empty() {
        servers.push(IceServer {
            urls: stun,
            ..Default::default()
        });
    }
    if !turn.is_empty() {
        servers.push(IceServer {
            urls: turn,
            username,
            credential,
        });
    }
    servers
}
