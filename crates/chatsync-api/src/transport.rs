// Request capability and its reqwest-backed implementation.
//
// The sync engine never talks HTTP directly: workers hold an
// `Arc<dyn RequestClient>` and decode responses through `request()`.
// `HttpClient` is the production implementation; tests substitute
// scripted clients.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::endpoint::Endpoint;
use crate::error::{Error, ErrorEnvelope};

const USER_AGENT: &str = concat!("chatsync/", env!("CARGO_PKG_VERSION"));

// ── Capability traits ───────────────────────────────────────────────

/// The abstract `request(endpoint) -> Result<T>` capability.
///
/// Implementations return the raw JSON payload; typed decoding happens in
/// [`request`] so the trait stays object safe.
pub trait RequestClient: Send + Sync {
    fn send(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<serde_json::Value, Error>>;
}

/// Callback that receives the realtime connection id exactly once.
pub type ConnectionIdWaiter = Box<dyn FnOnce(String) + Send>;

/// Source of the realtime connection id.
///
/// The waiter is invoked immediately if the id is already known, otherwise
/// once the handshake completes. Waiters still pending when the connection
/// is torn down are dropped without being called.
pub trait ConnectionIdProvider: Send + Sync {
    fn request_connection_id(&self, waiter: ConnectionIdWaiter);
}

// ── Typed helpers ───────────────────────────────────────────────────

/// Issue `endpoint` and decode the payload into `T`.
pub async fn request<T: DeserializeOwned>(
    client: &dyn RequestClient,
    endpoint: Endpoint,
) -> Result<T, Error> {
    let value = client.send(endpoint).await?;
    decode(&value)
}

/// Like [`request`], but resolves with [`Error::Timeout`] if no response
/// arrives within `timeout`.
pub async fn request_with_timeout<T: DeserializeOwned>(
    client: &dyn RequestClient,
    endpoint: Endpoint,
    timeout: Duration,
) -> Result<T, Error> {
    with_timeout(timeout, request(client, endpoint)).await
}

/// Like [`request`], but resolves with [`Error::Cancelled`] as soon as
/// `cancel` fires.
pub async fn request_cancellable<T: DeserializeOwned>(
    client: &dyn RequestClient,
    endpoint: Endpoint,
    cancel: &CancellationToken,
) -> Result<T, Error> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = request(client, endpoint) => result,
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Decode a JSON payload, keeping the raw body on failure.
pub fn decode<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, Error> {
    T::deserialize(value).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}

// ── TransportConfig ─────────────────────────────────────────────────

/// TLS verification mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Use the bundled webpki root store.
    #[default]
    System,
    /// Additionally trust the CA certificate in the given PEM file.
    CustomCa(PathBuf),
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);

        if let TlsMode::CustomCa(path) = &self.tls {
            let cert_pem = std::fs::read(path).map_err(|e| {
                Error::Tls(format!("failed to read CA cert {}: {e}", path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&cert_pem)
                .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(builder.build()?)
    }
}

// ── HttpClient ──────────────────────────────────────────────────────

/// Production [`RequestClient`] over HTTPS.
///
/// Adds the `api_key` query item and JWT authorization headers to every
/// call. Endpoints flagged `requires_connection_id` wait for the realtime
/// connection id (bounded by the request timeout) and append it as the
/// `connection_id` query item.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    token: SecretString,
    timeout: Duration,
    connection_ids: Option<Arc<dyn ConnectionIdProvider>>,
}

impl HttpClient {
    pub fn new(
        base_url: &Url,
        api_key: impl Into<String>,
        token: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, api_key, token, transport.timeout))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: &Url,
        api_key: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: normalize_base(base_url),
            api_key: api_key.into(),
            token,
            timeout,
            connection_ids: None,
        }
    }

    /// Attach the provider used for connection-id-aware endpoints.
    pub fn set_connection_id_provider(&mut self, provider: Arc<dyn ConnectionIdProvider>) {
        self.connection_ids = Some(provider);
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn wait_for_connection_id(&self) -> Result<String, Error> {
        let provider = self.connection_ids.as_ref().ok_or(Error::NoConnectionId)?;
        let (tx, rx) = oneshot::channel();
        provider.request_connection_id(Box::new(move |id| {
            let _ = tx.send(id);
        }));
        with_timeout(self.timeout, async {
            rx.await.map_err(|_| Error::NoConnectionId)
        })
        .await
    }

    async fn execute(&self, endpoint: Endpoint) -> Result<serde_json::Value, Error> {
        let mut url = self.base_url.join(&endpoint.path)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api_key", &self.api_key);
            for (k, v) in &endpoint.query {
                pairs.append_pair(k, v);
            }
        }
        if endpoint.requires_connection_id {
            let connection_id = self.wait_for_connection_id().await?;
            url.query_pairs_mut()
                .append_pair("connection_id", &connection_id);
        }

        debug!(method = ?endpoint.method, path = %endpoint.path, "sending request");

        let mut builder = self
            .http
            .request(endpoint.method.into(), url)
            .header("Authorization", self.token.expose_secret())
            .header("Stream-Auth-Type", "jwt");
        if let Some(body) = &endpoint.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        trace!(status = status.as_u16(), body = %body, "response received");

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

impl RequestClient for HttpClient {
    fn send(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<serde_json::Value, Error>> {
        Box::pin(self.execute(endpoint))
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Translate a non-2xx response into [`Error::Api`], using the server's
/// error envelope when it parses.
fn api_error(status: u16, body: &str) -> Error {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => Error::Api {
            status,
            code: env.error.code,
            message: env.error.message.unwrap_or_else(|| body.to_owned()),
        },
        Err(_) => Error::Api {
            status,
            code: None,
            message: body.to_owned(),
        },
    }
}

/// `Url::join` drops the last path segment unless the base ends with `/`.
pub(crate) fn normalize_base(base: &Url) -> Url {
    let mut url = base.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
