//! Shared configuration for chatsync clients.
//!
//! TOML profiles, token resolution (env + plaintext), and translation to
//! `chatsync_core::ClientConfig`. The binary layers its command-line
//! overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use chatsync_core::{ClientConfig, CurrentUser, ReconnectConfig, StorageMode, TlsMode};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' not found")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named service profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// The named profile, or the default one when `name` is `None`.
    pub fn profile<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Where a profile keeps its local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    Memory,
    #[default]
    Disk,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Keepalive ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,

    #[serde(default)]
    pub storage: Storage,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            ping_interval: default_ping_interval(),
            storage: Storage::default(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_ping_interval() -> u64 {
    25
}

/// A named service profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// REST base URL (e.g., "https://chat.example.com").
    pub base_url: String,

    /// Realtime base URL. Derived from `base_url` when absent.
    pub ws_url: Option<String>,

    /// Application API key.
    pub api_key: String,

    /// User the client connects as.
    pub user_id: String,

    /// Display name sent with the user record.
    pub user_name: Option<String>,

    /// User token (plaintext, prefer `token_env`).
    pub token: Option<String>,

    /// Environment variable name containing the user token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Override storage mode.
    pub storage: Option<Storage>,

    /// Store root; defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// First reconnect delay in milliseconds.
    pub reconnect_initial_ms: Option<u64>,

    /// Reconnect delay cap in milliseconds.
    pub reconnect_max_ms: Option<u64>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "chatsync", "chatsync")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default root for on-disk stores.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn home_fallback(sub: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(sub);
    p.push("chatsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys nest on `__`, e.g.
/// `CHATSYNC_PROFILES__WORK__TOKEN` or `CHATSYNC_DEFAULTS__TIMEOUT`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CHATSYNC_").split("__"))
        .extract()?;
    Ok(config)
}

/// Load config, returning a default if nothing can be loaded.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the user token: `token_env` variable first, then plaintext.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

/// `https://host` → `wss://host`, `http://host` → `ws://host`.
fn realtime_url(base: &Url) -> Result<Url, ConfigError> {
    let scheme = match base.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ConfigError::Validation {
                field: "ws_url".into(),
                reason: format!("cannot derive a realtime URL from scheme '{other}'"),
            });
        }
    };
    let mut url = base.clone();
    url.set_scheme(scheme).map_err(|()| ConfigError::Validation {
        field: "ws_url".into(),
        reason: format!("cannot derive a realtime URL from {base}"),
    })?;
    Ok(url)
}

/// Build a `ClientConfig` from a profile, falling back to `defaults` for
/// anything the profile leaves unset.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let base_url = parse_url("base_url", &profile.base_url)?;
    let ws_url = match profile.ws_url.as_deref() {
        Some(raw) => parse_url("ws_url", raw)?,
        None => realtime_url(&base_url)?,
    };
    if profile.user_id.is_empty() {
        return Err(ConfigError::Validation {
            field: "user_id".into(),
            reason: "must not be empty".into(),
        });
    }
    let token = resolve_token(profile, profile_name)?;

    let user = CurrentUser {
        id: profile.user_id.clone(),
        name: profile.user_name.clone(),
    };
    let mut config = ClientConfig::new(profile.api_key.clone(), base_url, ws_url, user, token);

    config.storage = match profile.storage.unwrap_or(defaults.storage) {
        Storage::Memory => StorageMode::InMemory,
        Storage::Disk => StorageMode::OnDisk {
            root: profile.data_dir.clone().unwrap_or_else(data_dir),
        },
    };
    if let Some(ref ca_path) = profile.ca_cert {
        config.tls = TlsMode::CustomCa(ca_path.clone());
    }
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.ping_interval = Duration::from_secs(defaults.ping_interval);

    let mut reconnect = ReconnectConfig::default();
    if let Some(ms) = profile.reconnect_initial_ms {
        reconnect.initial_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = profile.reconnect_max_ms {
        reconnect.max_delay = Duration::from_millis(ms);
    }
    if reconnect.initial_delay > reconnect.max_delay {
        return Err(ConfigError::Validation {
            field: "reconnect_initial_ms".into(),
            reason: "must not exceed reconnect_max_ms".into(),
        });
    }
    config.reconnect = reconnect;

    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn profile() -> Profile {
        Profile {
            base_url: "https://chat.example.com".into(),
            ws_url: None,
            api_key: "key".into(),
            user_id: "u1".into(),
            user_name: Some("Luke".into()),
            token: Some("plain".into()),
            token_env: None,
            ca_cert: None,
            timeout: None,
            storage: None,
            data_dir: None,
            reconnect_initial_ms: None,
            reconnect_max_ms: None,
        }
    }

    const SAMPLE: &str = r#"
        default_profile = "work"

        [defaults]
        timeout = 10

        [profiles.work]
        base_url = "https://chat.example.com"
        api_key = "key"
        user_id = "u1"
        token = "plain"
        storage = "memory"
    "#;

    // Every test that loads through figment runs inside a `Jail` so the
    // environment it reads is isolated from tests that set variables.

    #[test]
    fn loads_profiles_from_toml() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;

            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;

            assert_eq!(config.defaults.timeout, 10);
            assert_eq!(config.defaults.ping_interval, 25);
            let (name, work) = config.profile(None).unwrap();
            assert_eq!(name, "work");
            assert_eq!(work.storage, Some(Storage::Memory));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let config = load_config_from(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            assert!(matches!(
                config.profile(None),
                Err(ConfigError::UnknownProfile { .. })
            ));
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("CHATSYNC_DEFAULTS__TIMEOUT", "99");
            jail.set_env("CHATSYNC_PROFILES__WORK__USER_ID", "u2");

            let config = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;

            assert_eq!(config.defaults.timeout, 99);
            assert_eq!(config.profiles["work"].user_id, "u2");
            Ok(())
        });
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.profiles.insert("default".into(), profile());

        save_config_to(&config, &path).unwrap();

        Jail::expect_with(|_jail| {
            let loaded = load_config_from(&path).map_err(|e| e.to_string())?;
            assert_eq!(loaded, config);
            Ok(())
        });
    }

    #[test]
    fn token_env_wins_over_plaintext() {
        Jail::expect_with(|jail| {
            jail.set_env("CHATSYNC_TEST_TOKEN", "from-env");
            let mut p = profile();
            p.token_env = Some("CHATSYNC_TEST_TOKEN".into());
            let token = resolve_token(&p, "default").unwrap();
            assert_eq!(token.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn missing_token_is_an_error() {
        let mut p = profile();
        p.token = None;
        p.token_env = Some("CHATSYNC_UNSET_TOKEN_FOR_TEST".into());
        assert!(matches!(
            resolve_token(&p, "default"),
            Err(ConfigError::NoCredentials { .. })
        ));
    }

    #[test]
    fn client_config_derives_realtime_url_and_storage() {
        let p = profile();
        let config = profile_to_client_config(&p, "default", &Defaults::default()).unwrap();

        assert_eq!(config.ws_url.as_str(), "wss://chat.example.com/");
        assert_eq!(config.user.name.as_deref(), Some("Luke"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(matches!(config.storage, StorageMode::OnDisk { .. }));
        assert_eq!(config.tls, TlsMode::System);
    }

    #[test]
    fn client_config_applies_overrides() {
        let mut p = profile();
        p.base_url = "http://localhost:3030".into();
        p.storage = Some(Storage::Memory);
        p.timeout = Some(5);
        p.ca_cert = Some(PathBuf::from("/etc/ca.pem"));
        p.reconnect_initial_ms = Some(100);
        p.reconnect_max_ms = Some(1_000);

        let config = profile_to_client_config(&p, "default", &Defaults::default()).unwrap();

        assert_eq!(config.ws_url.as_str(), "ws://localhost:3030/");
        assert_eq!(config.storage, StorageMode::InMemory);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.tls, TlsMode::CustomCa(PathBuf::from("/etc/ca.pem")));
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(100));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(1));
    }

    #[test]
    fn invalid_profile_values_are_rejected() {
        let mut bad_url = profile();
        bad_url.base_url = "not a url".into();
        assert!(matches!(
            profile_to_client_config(&bad_url, "default", &Defaults::default()),
            Err(ConfigError::Validation { field, .. }) if field == "base_url"
        ));

        let mut bad_backoff = profile();
        bad_backoff.reconnect_initial_ms = Some(60_000);
        assert!(matches!(
            profile_to_client_config(&bad_backoff, "default", &Defaults::default()),
            Err(ConfigError::Validation { .. })
        ));
    }
}
