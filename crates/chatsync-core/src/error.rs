// ── Core error types ──
//
// Domain-level errors from chatsync-core. Wire-layer failures are
// translated by the `From<chatsync_api::Error>` impl so consumers never
// match on reqwest or serde errors directly.

use std::path::PathBuf;

use thiserror::Error;

/// Local store failures.
///
/// `Persistence` is fatal: the store stops accepting writes and every later
/// write resolves with `Closed`.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Failed to persist store to {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error("Local store is closed")]
    Closed,

    #[error("Store serialization failed: {0}")]
    Serialization(String),

    #[error("Store I/O error: {0}")]
    Io(String),
}

impl StoreError {
    /// The store cannot continue after this error. Only `Closed` is a
    /// consequence rather than a cause.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach chat service: {reason}")]
    ConnectionFailed { reason: String },

    #[error("User token expired")]
    TokenExpired,

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Request cancelled")]
    Cancelled,

    #[error("No realtime connection id available")]
    NoConnectionId,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Channel not found: {cid}")]
    ChannelNotFound { cid: String },

    #[error("Message not found: {id}")]
    MessageNotFound { id: String },

    #[error("Controller is not running")]
    ControllerStopped,

    #[error("Invalid channel id: {0:?}")]
    InvalidChannelId(String),

    #[error("Unexpected response payload: {message}")]
    Payload { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        code: Option<u32>,
        status: Option<u16>,
    },

    // ── Store errors ─────────────────────────────────────────────────
    #[error(transparent)]
    Store(#[from] StoreError),

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// The session must be torn down.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Store(e) => e.is_fatal(),
            _ => false,
        }
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<chatsync_api::Error> for CoreError {
    fn from(err: chatsync_api::Error) -> Self {
        use chatsync_api::Error as ApiError;

        if err.is_token_expired() {
            return CoreError::TokenExpired;
        }

        match err {
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_ms: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Tls(message) => CoreError::Config { message },
            ApiError::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            ApiError::Cancelled => CoreError::Cancelled,
            ApiError::NoConnectionId => CoreError::NoConnectionId,
            ApiError::WebSocketConnect(reason) => CoreError::ConnectionFailed { reason },
            ApiError::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            ApiError::LivenessTimeout { interval_secs } => CoreError::ConnectionFailed {
                reason: format!("no pong within {interval_secs}s"),
            },
            ApiError::Api {
                status,
                code,
                message,
            } => CoreError::Api {
                message,
                code,
                status: Some(status),
            },
            ApiError::TokenExpired => CoreError::TokenExpired,
            ApiError::Deserialization { message, body: _ } => CoreError::Payload { message },
        }
    }
}
