//! Realtime event connection with handshake, keepalive and auto-reconnect.
//!
//! [`RealtimeClient`] owns one physical connection at a time. Decoded
//! [`ChatEvent`]s are published on a [`tokio::sync::broadcast`] channel in
//! arrival order; the lifecycle is observable through a
//! [`tokio::sync::watch`] channel.
//!
//! ```rust,ignore
//! let realtime = RealtimeClient::with_tungstenite(config)?;
//! let mut events = realtime.subscribe();
//! realtime.connect();
//!
//! while let Ok(event) = events.recv().await {
//!     tracing::info!(?event, "event");
//! }
//! ```

mod handshake;
mod socket;
mod state;

pub use handshake::{HandshakePayload, UserDetails, connection_url};
pub use socket::{Connector, Frame, FrameSink, FrameStream, NO_STATUS_CODE, TungsteniteConnector};
pub use state::{
    Backoff, ConnectionIdSlot, ConnectionState, DisconnectReason, ReconnectConfig, delay_for,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, ErrorEnvelope, TOKEN_EXPIRED_CODE};
use crate::events::ChatEvent;
use crate::transport::{ConnectionIdProvider, ConnectionIdWaiter};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Interval between keepalive pings once connected.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);

const NORMAL_CLOSE: u16 = 1000;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ── RealtimeConfig ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// WebSocket base URL, e.g. `wss://chat.example.com`.
    pub url: Url,
    pub api_key: String,
    pub user_id: String,
    pub token: SecretString,
    pub reconnect: ReconnectConfig,
    pub ping_interval: Duration,
}

// ── RealtimeClient ───────────────────────────────────────────────────

/// Handle to the realtime connection. Clones share the same connection.
#[derive(Clone)]
pub struct RealtimeClient {
    shared: Arc<Shared>,
}

/// Identifies the running session. Bumped on every `connect()` and
/// `disconnect()` so a superseded session can no longer touch shared state.
struct Session {
    generation: u64,
    cancel: Option<CancellationToken>,
}

struct Shared {
    url: Url,
    reconnect: ReconnectConfig,
    ping_interval: Duration,
    connector: Arc<dyn Connector>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<Arc<ChatEvent>>,
    session: Mutex<Session>,
    connection_id: Mutex<ConnectionIdSlot>,
}

impl RealtimeClient {
    pub fn new(config: RealtimeConfig, connector: Arc<dyn Connector>) -> Result<Self, Error> {
        let url = connection_url(&config.url, &config.api_key, &config.user_id, &config.token)?;
        let (state_tx, _) = watch::channel(ConnectionState::Initialized);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                url,
                reconnect: config.reconnect,
                ping_interval: config.ping_interval,
                connector,
                state_tx,
                events_tx,
                session: Mutex::new(Session {
                    generation: 0,
                    cancel: None,
                }),
                connection_id: Mutex::new(ConnectionIdSlot::default()),
            }),
        })
    }

    pub fn with_tungstenite(config: RealtimeConfig) -> Result<Self, Error> {
        Self::new(config, Arc::new(TungsteniteConnector))
    }

    /// Start a session. No-op while one is already connecting, connected or
    /// waiting to reconnect. Must be called inside a Tokio runtime.
    pub fn connect(&self) {
        let mut session = lock(&self.shared.session);
        if session.cancel.is_some() {
            debug!(state = ?*self.shared.state_tx.borrow(), "connect ignored, session active");
            return;
        }

        session.generation += 1;
        let generation = session.generation;
        let cancel = CancellationToken::new();
        session.cancel = Some(cancel.clone());
        self.shared.set_state(ConnectionState::Connecting);
        drop(session);

        tokio::spawn(run_session(Arc::clone(&self.shared), generation, cancel));
    }

    /// Stop the session and turn auto-reconnect off. Pending connection-id
    /// waiters are dropped.
    pub fn disconnect(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut session = lock(&self.shared.session);
        let Some(cancel) = session.cancel.take() else {
            debug!(reason, "disconnect ignored, no active session");
            return;
        };

        info!(reason, "disconnecting realtime connection");
        self.shared.set_state(ConnectionState::Disconnecting);
        session.generation += 1;
        cancel.cancel();
        lock(&self.shared.connection_id).clear();
        self.shared
            .set_state(ConnectionState::Disconnected(Some(DisconnectReason::Requested(reason))));
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// New receiver for decoded events. Slow receivers see
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChatEvent>> {
        self.shared.events_tx.subscribe()
    }

    pub fn connection_id(&self) -> Option<String> {
        lock(&self.shared.connection_id).current().map(str::to_owned)
    }
}

impl ConnectionIdProvider for RealtimeClient {
    fn request_connection_id(&self, waiter: ConnectionIdWaiter) {
        let ready = lock(&self.shared.connection_id).register(waiter);
        if let Some((id, waiter)) = ready {
            waiter(id);
        }
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("state", &*self.shared.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

// ── Shared state transitions ─────────────────────────────────────────

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        info!(?state, "realtime state changed");
        self.state_tx.send_replace(state);
    }

    /// Apply `state` if `generation` is still the live session.
    fn transition(&self, generation: u64, state: ConnectionState) -> bool {
        let session = lock(&self.session);
        if session.generation != generation {
            return false;
        }
        self.set_state(state);
        true
    }

    fn complete_handshake(&self, generation: u64, connection_id: &str) -> bool {
        let waiters = {
            let session = lock(&self.session);
            if session.generation != generation {
                return false;
            }
            self.set_state(ConnectionState::Connected {
                connection_id: connection_id.to_owned(),
            });
            lock(&self.connection_id).resolve(connection_id.to_owned())
        };
        for waiter in waiters {
            waiter(connection_id.to_owned());
        }
        true
    }

    fn connection_lost(&self, generation: u64) {
        let session = lock(&self.session);
        if session.generation == generation {
            lock(&self.connection_id).invalidate();
        }
    }

    /// End the session from inside its own task.
    fn finish(&self, generation: u64, state: ConnectionState) {
        let mut session = lock(&self.session);
        if session.generation != generation {
            return;
        }
        session.cancel = None;
        lock(&self.connection_id).clear();
        self.set_state(state);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Session loop ─────────────────────────────────────────────────────

/// connect → read → on loss, backoff → reconnect, until cancelled or the
/// token is rejected.
async fn run_session(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    let mut backoff = Backoff::new(shared.reconnect.clone());

    loop {
        let result = connect_and_read(&shared, generation, &cancel, &mut backoff).await;
        if cancel.is_cancelled() {
            break;
        }
        shared.connection_lost(generation);

        match result {
            Ok(()) => info!("realtime stream ended"),
            Err(e) if e.is_token_expired() => {
                warn!("user token expired, auto-reconnect disabled");
                shared.finish(
                    generation,
                    ConnectionState::Disconnected(Some(DisconnectReason::TokenExpired)),
                );
                break;
            }
            Err(e) => warn!(error = %e, failures = backoff.failures(), "realtime connection lost"),
        }

        let delay = backoff.next_delay();
        let attempt = backoff.failures();
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "scheduling reconnect"
        );
        if !shared.transition(generation, ConnectionState::Reconnecting { attempt, delay }) {
            break;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        if !shared.transition(generation, ConnectionState::Connecting) {
            break;
        }
    }

    debug!(generation, "realtime session exiting");
}

/// One physical connection, from open until it drops or the session is
/// cancelled. `Ok(())` means the stream ended or we were told to stop.
async fn connect_and_read(
    shared: &Shared,
    generation: u64,
    cancel: &CancellationToken,
    backoff: &mut Backoff,
) -> Result<(), Error> {
    debug!("opening realtime connection");

    let (mut sink, mut stream) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        result = shared.connector.connect(&shared.url) => result?,
    };

    if !shared.transition(generation, ConnectionState::AwaitingHandshake) {
        return Ok(());
    }

    // Armed only after the handshake.
    let mut keepalive: Option<Interval> = None;
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let close = Frame::Close { code: NORMAL_CLOSE, reason: "client disconnect".into() };
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.send(close)).await;
                return Ok(());
            }
            () = tick(&mut keepalive) => {
                if awaiting_pong {
                    return Err(Error::LivenessTimeout {
                        interval_secs: shared.ping_interval.as_secs(),
                    });
                }
                trace!("sending keepalive ping");
                sink.send(Frame::Ping(Vec::new())).await?;
                awaiting_pong = true;
            }
            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => {
                    let handshaking = keepalive.is_none();
                    if let Some(connection_id) = handle_text(&shared.events_tx, &text, handshaking)? {
                        if !shared.complete_handshake(generation, &connection_id) {
                            return Ok(());
                        }
                        backoff.reset();
                        keepalive = Some(keepalive_interval(shared.ping_interval));
                        awaiting_pong = false;
                    }
                }
                Some(Ok(Frame::Pong(_))) => awaiting_pong = false,
                Some(Ok(Frame::Ping(_))) => trace!("ping received"),
                Some(Ok(Frame::Close { code, reason })) => {
                    info!(code, reason = %reason, "realtime close frame received");
                    return Err(Error::WebSocketClosed { code, reason });
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            }
        }
    }
}

fn keepalive_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Resolves on the next keepalive tick, or never while suspended.
async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ── Message handling ─────────────────────────────────────────────────

/// Handle one text frame.
///
/// Returns the connection id if this frame completes the handshake.
/// Error envelopes end the connection; anything undecodable is dropped.
fn handle_text(
    events_tx: &broadcast::Sender<Arc<ChatEvent>>,
    text: &str,
    handshaking: bool,
) -> Result<Option<String>, Error> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "dropping malformed realtime message");
            return Ok(None);
        }
    };

    if value.get("error").is_some_and(|e| !e.is_null()) {
        return Err(stream_error(&value));
    }

    if handshaking {
        if let Some(id) = value.get("connection_id").and_then(serde_json::Value::as_str) {
            return Ok(Some(id.to_owned()));
        }
    }

    match ChatEvent::deserialize(&value) {
        Ok(event) => {
            trace!(?event, "realtime event");
            // No subscribers is fine.
            let _ = events_tx.send(Arc::new(event));
        }
        Err(e) => debug!(error = %e, "dropping undecodable realtime event"),
    }
    Ok(None)
}

fn stream_error(value: &serde_json::Value) -> Error {
    match ErrorEnvelope::deserialize(value) {
        Ok(env) if env.error.code == Some(TOKEN_EXPIRED_CODE) => Error::TokenExpired,
        Ok(env) => Error::Api {
            status: env.error.status_code.unwrap_or_default(),
            code: env.error.code,
            message: env.error.message.unwrap_or_default(),
        },
        Err(e) => Error::Deserialization {
            message: e.to_string(),
            body: value.to_string(),
        },
    }
}
