// Scripted request client for worker unit tests.
#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use chatsync_api::{Endpoint, Error, RequestClient};

/// Replays queued responses in order and records every endpoint it saw.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    responses: Mutex<VecDeque<Result<serde_json::Value, Error>>>,
    requests: Mutex<Vec<Endpoint>>,
}

#[allow(clippy::unwrap_used)]
impl ScriptedClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push_ok(&self, value: serde_json::Value) {
        self.responses.lock().unwrap().push_back(Ok(value));
    }

    pub(crate) fn push_err(&self, error: Error) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn requests(&self) -> Vec<Endpoint> {
        self.requests.lock().unwrap().clone()
    }
}

#[allow(clippy::unwrap_used)]
impl RequestClient for ScriptedClient {
    fn send(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<serde_json::Value, Error>> {
        self.requests.lock().unwrap().push(endpoint);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::NoConnectionId));
        Box::pin(async move { next })
    }
}
