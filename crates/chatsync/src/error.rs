//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use chatsync_config::ConfigError;
use chatsync_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const STORAGE: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("No profile '{profile}' in {path}")]
    #[diagnostic(
        code(chatsync::no_profile),
        help("Add a [profiles.{profile}] table with base_url, api_key and user_id.")
    )]
    NoProfile { profile: String, path: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(chatsync::no_credentials),
        help("Set token_env or token in the profile, or pass --token / CHATSYNC_TOKEN.")
    )]
    NoCredentials { profile: String },

    #[error("Invalid {field}: {reason}")]
    #[diagnostic(code(chatsync::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(chatsync::config))]
    Config(ConfigError),

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Could not reach the chat service: {reason}")]
    #[diagnostic(
        code(chatsync::connection_failed),
        help("Check base_url / ws_url in the profile and your network connection.")
    )]
    ConnectionFailed { reason: String },

    #[error("The user token was rejected")]
    #[diagnostic(code(chatsync::token_expired), help("Issue a fresh token for this user."))]
    TokenExpired,

    #[error("Channel '{cid}' not found")]
    #[diagnostic(code(chatsync::not_found))]
    NotFound { cid: String },

    #[error("Request timed out")]
    #[diagnostic(code(chatsync::timeout))]
    Timeout,

    #[error("Local cache failed: {message}")]
    #[diagnostic(
        code(chatsync::storage),
        help("Retry with --in-memory, or remove the cache directory for this user.")
    )]
    Storage { message: String },

    #[error(transparent)]
    #[diagnostic(code(chatsync::core))]
    Core(CoreError),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => Self::ConnectionFailed { reason },
            CoreError::TokenExpired => Self::TokenExpired,
            CoreError::ChannelNotFound { cid } => Self::NotFound { cid },
            CoreError::InvalidChannelId(raw) => Self::Validation {
                field: "cid".into(),
                reason: format!("expected type:id, got '{raw}'"),
            },
            CoreError::Timeout { .. } => Self::Timeout,
            CoreError::Store(e) => Self::Storage {
                message: e.to_string(),
            },
            other => Self::Core(other),
        }
    }
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoProfile { .. } | Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            Self::NoCredentials { .. } | Self::TokenExpired => exit_code::AUTH,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout => exit_code::TIMEOUT,
            Self::Storage { .. } => exit_code::STORAGE,
            Self::Core(_) => exit_code::GENERAL,
        }
    }
}
