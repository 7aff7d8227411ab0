// ── Connection lifecycle state, backoff policy, connection-id waiters ──
//
// Everything here is synchronous and side-effect free so the reconnect and
// waiter rules can be tested without a socket.

use std::time::Duration;

use rand::Rng;

use crate::transport::ConnectionIdWaiter;

// ── ConnectionState ──────────────────────────────────────────────────

/// Why the connection ended up `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    Requested(String),
    /// The server rejected the user token; auto-reconnect is off.
    TokenExpired,
}

/// Lifecycle of the realtime connection.
///
/// `Disconnected → Connecting → AwaitingHandshake → Connected →
/// Disconnecting → Disconnected`, with `Reconnecting` re-entering
/// `Connecting` after a backoff delay.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Initialized,
    Disconnected(Option<DisconnectReason>),
    Connecting,
    AwaitingHandshake,
    Connected {
        connection_id: String,
    },
    Disconnecting,
    Reconnecting {
        attempt: u32,
        delay: Duration,
    },
}

impl ConnectionState {
    /// A session is running (or about to) and `connect()` must not start another.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting
                | Self::AwaitingHandshake
                | Self::Connected { .. }
                | Self::Reconnecting { .. }
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn connection_id(&self) -> Option<&str> {
        match self {
            Self::Connected { connection_id } => Some(connection_id),
            _ => None,
        }
    }
}

// ── ReconnectConfig / Backoff ────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 500ms.
    pub initial_delay: Duration,
    /// Upper bound on backoff delay. Default: 25s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(25),
        }
    }
}

/// Upper bound of the jitter multiplier. Must stay below 2.0 so one attempt's
/// worst case never exceeds the next attempt's best case.
const JITTER_MAX: f64 = 1.25;

/// Exponent clamp; `2^32 * initial` is past any sane cap.
const MAX_EXPONENT: u32 = 32;

/// Consecutive-failure counter and delay calculator.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Number of failures since the last successful handshake.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = rand::thread_rng().gen_range(1.0..JITTER_MAX);
        let delay = delay_for(self.failures, jitter, &self.config);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// `min(initial * 2^failures * jitter, max)`.
///
/// With `jitter` in `[1.0, JITTER_MAX)` the sequence is non-decreasing in
/// `failures` and never exceeds `max_delay`.
pub fn delay_for(failures: u32, jitter: f64, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(failures.min(MAX_EXPONENT)).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let jittered = base * jitter.clamp(1.0, JITTER_MAX);
    let capped = jittered.min(config.max_delay.as_secs_f64()).max(0.0);
    Duration::from_secs_f64(capped)
}

// ── Connection-id waiters ────────────────────────────────────────────

/// The current connection id plus callbacks waiting for one.
///
/// Each waiter fires at most once. The slot never calls waiters itself;
/// it hands them back so the caller can run them outside any lock.
#[derive(Default)]
pub struct ConnectionIdSlot {
    id: Option<String>,
    waiters: Vec<ConnectionIdWaiter>,
}

impl ConnectionIdSlot {
    pub fn current(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Register a waiter. If the id is already known the waiter is returned
    /// together with it for immediate delivery.
    pub fn register(&mut self, waiter: ConnectionIdWaiter) -> Option<(String, ConnectionIdWaiter)> {
        match &self.id {
            Some(id) => Some((id.clone(), waiter)),
            None => {
                self.waiters.push(waiter);
                None
            }
        }
    }

    /// Record the id and take every pending waiter.
    pub fn resolve(&mut self, id: String) -> Vec<ConnectionIdWaiter> {
        self.id = Some(id);
        std::mem::take(&mut self.waiters)
    }

    /// Forget the id after a lost connection. Pending waiters keep waiting
    /// for the next handshake.
    pub fn invalidate(&mut self) {
        self.id = None;
    }

    /// Forget the id. Pending waiters are dropped without being called.
    pub fn clear(&mut self) {
        self.id = None;
        self.waiters.clear();
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }
}

impl std::fmt::Debug for ConnectionIdSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionIdSlot")
            .field("id", &self.id)
            .field("pending", &self.waiters.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn config() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }

    #[test]
    fn backoff_is_non_decreasing_and_capped() {
        let mut backoff = Backoff::new(config());
        let mut previous = Duration::ZERO;
        for _ in 0..40 {
            let delay = backoff.next_delay();
            assert!(delay >= previous, "{delay:?} < {previous:?}");
            assert!(delay <= Duration::from_secs(10));
            previous = delay;
        }
        assert_eq!(backoff.failures(), 40);
        assert_eq!(previous, Duration::from_secs(10));
    }

    #[test]
    fn worst_jitter_never_exceeds_next_best() {
        let cfg = config();
        for n in 0..20 {
            let worst = delay_for(n, JITTER_MAX, &cfg);
            let best = delay_for(n + 1, 1.0, &cfg);
            assert!(worst <= best, "attempt {n}: {worst:?} > {best:?}");
        }
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut backoff = Backoff::new(config());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert!(backoff.next_delay() < Duration::from_millis(625));
    }

    #[test]
    fn waiter_registered_before_resolve_fires_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut slot = ConnectionIdSlot::default();

        let h = hits.clone();
        assert!(slot.register(Box::new(move |id| {
            assert_eq!(id, "abc");
            h.fetch_add(1, Ordering::SeqCst);
        })).is_none());
        assert_eq!(slot.pending(), 1);

        for waiter in slot.resolve("abc".into()) {
            waiter("abc".into());
        }
        assert_eq!(slot.pending(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A second resolve has nobody left to notify.
        assert!(slot.resolve("abc".into()).is_empty());
    }

    #[test]
    fn waiter_registered_after_resolve_is_handed_back() {
        let mut slot = ConnectionIdSlot::default();
        slot.resolve("abc".into());
        let (id, waiter) = slot.register(Box::new(|_| {})).unwrap();
        assert_eq!(id, "abc");
        waiter(id);
        assert_eq!(slot.pending(), 0);
    }

    #[test]
    fn clear_drops_pending_waiters() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut slot = ConnectionIdSlot::default();
        let h = hits.clone();
        slot.register(Box::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        slot.clear();
        assert_eq!(slot.pending(), 0);
        assert!(slot.current().is_none());
        assert!(slot.resolve("later".into()).is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn active_states() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(
            ConnectionState::Reconnecting {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
            .is_active()
        );
        assert!(!ConnectionState::Disconnected(None).is_active());
        assert!(!ConnectionState::Initialized.is_active());
    }
}
