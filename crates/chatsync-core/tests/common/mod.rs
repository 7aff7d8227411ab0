// Shared fixtures for the sync engine integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use chatsync_api::{Endpoint, Error, RequestClient};

// ── Scripted request client ─────────────────────────────────────────

/// Replays queued responses in order and records every endpoint it saw.
///
/// A gated client holds each response until the test releases it with
/// [`ScriptedClient::release`].
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<Value, Error>>>,
    requests: Mutex<Vec<Endpoint>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            gate: Some(Arc::new(Semaphore::new(0))),
        })
    }

    pub fn push_ok(&self, value: Value) {
        self.responses.lock().unwrap().push_back(Ok(value));
    }

    pub fn push_err(&self, error: Error) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Let one held request complete.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    pub fn requests(&self) -> Vec<Endpoint> {
        self.requests.lock().unwrap().clone()
    }
}

impl RequestClient for ScriptedClient {
    fn send(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<Value, Error>> {
        self.requests.lock().unwrap().push(endpoint);
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(Error::NoConnectionId))
        })
    }
}

// ── Payload builders ────────────────────────────────────────────────

/// A channel-list response: `(cid, [member user ids])` per channel.
pub fn channel_list(channels: &[(&str, &[&str])]) -> Value {
    let channels: Vec<Value> = channels
        .iter()
        .map(|(cid, members)| {
            json!({
                "channel": { "cid": cid },
                "members": members
                    .iter()
                    .map(|id| json!({ "user": { "id": id } }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "channels": channels })
}

// ── Async helpers ───────────────────────────────────────────────────

/// Await `fut`, failing the test after five seconds.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    within(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}
