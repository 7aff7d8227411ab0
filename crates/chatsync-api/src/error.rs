use thiserror::Error;

/// Server error code for an expired user token.
pub const TOKEN_EXPIRED_CODE: u32 = 40;

/// Top-level error type for the `chatsync-api` crate.
///
/// Covers every failure mode of the wire layer: HTTP transport, the
/// realtime connection, remote error responses, and payload decoding.
/// `chatsync-core` maps these into domain-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup error (unreadable or invalid CA certificate).
    #[error("TLS error: {0}")]
    Tls(String),

    /// Request timed out on the caller side.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The pending call was cancelled before a response arrived.
    #[error("Request cancelled")]
    Cancelled,

    // ── Realtime ────────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// Keepalive detected a dead connection (no pong before the next tick).
    #[error("No pong received within {interval_secs}s")]
    LivenessTimeout { interval_secs: u64 },

    /// A connection id was required but the transport never produced one.
    #[error("No connection id available")]
    NoConnectionId,

    // ── Remote ──────────────────────────────────────────────────────
    /// Non-2xx response with the server's error envelope, if any.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: Option<u32>,
        message: String,
    },

    /// The user token is no longer accepted.
    #[error("User token expired")]
    TokenExpired,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON (de)serialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. }
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. }
            | Self::LivenessTimeout { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the credential was rejected as expired.
    pub fn is_token_expired(&self) -> bool {
        match self {
            Self::TokenExpired => true,
            Self::Api { code, .. } => *code == Some(TOKEN_EXPIRED_CODE),
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" response.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }
}

/// Error envelope the server sends for failed calls and on the realtime stream.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "StatusCode")]
    pub status_code: Option<u16>,
}
