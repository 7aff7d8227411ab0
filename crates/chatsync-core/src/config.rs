// ── Runtime client configuration ──
//
// These types describe how to reach the chat service and where to keep
// the local cache. They carry credentials but never touch disk themselves.
// The binary (or chatsync-config) builds a `ClientConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

pub use chatsync_api::TlsMode;
pub use chatsync_api::websocket::{DEFAULT_PING_INTERVAL, ReconnectConfig};

/// The user the client acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub name: Option<String>,
}

/// Where the local store lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Ephemeral; nothing survives the process.
    #[default]
    InMemory,
    /// One store per user under `root/<user-id>/`.
    OnDisk { root: PathBuf },
}

/// Configuration for a [`ChatClient`](crate::ChatClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    /// REST base URL.
    pub base_url: Url,
    /// Realtime base URL.
    pub ws_url: Url,
    pub user: CurrentUser,
    pub token: SecretString,
    pub storage: StorageMode,
    pub tls: TlsMode,
    pub timeout: Duration,
    pub reconnect: ReconnectConfig,
    pub ping_interval: Duration,
}

impl ClientConfig {
    /// Config with default tuning and in-memory storage.
    pub fn new(
        api_key: impl Into<String>,
        base_url: Url,
        ws_url: Url,
        user: CurrentUser,
        token: SecretString,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url,
            ws_url,
            user,
            token,
            storage: StorageMode::InMemory,
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }
}
