// ── Event-ingestion worker ──
//
// Subscribes to the realtime event stream and turns every relevant event
// into exactly one store write, in receive order. Events skipped because
// the receiver lagged are made up for by re-fetching stored queries.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use chatsync_api::ChatEvent;

use super::ChannelListUpdater;
use super::apply::{apply_event, is_relevant};
use crate::error::CoreError;
use crate::model::ChannelListQuery;
use crate::store::LocalStore;

/// Background task applying push events to the store. Stops when dropped.
pub struct EventHandler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl EventHandler {
    /// Start consuming `events`. Must be called inside a Tokio runtime.
    pub fn spawn(
        events: broadcast::Receiver<Arc<ChatEvent>>,
        store: LocalStore,
        current_user: impl Into<String>,
    ) -> Self {
        Self::start(events, store, current_user.into(), None)
    }

    /// Like [`spawn`](Self::spawn), but after a lag every stored query is
    /// re-fetched through `resync`.
    pub fn spawn_with_resync(
        events: broadcast::Receiver<Arc<ChatEvent>>,
        store: LocalStore,
        current_user: impl Into<String>,
        resync: ChannelListUpdater,
    ) -> Self {
        Self::start(events, store, current_user.into(), Some(resync))
    }

    fn start(
        events: broadcast::Receiver<Arc<ChatEvent>>,
        store: LocalStore,
        current_user: String,
        resync: Option<ChannelListUpdater>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ingest_task(
            events,
            store,
            current_user,
            resync,
            cancel.clone(),
        ));
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop and wait for the task to finish its current write.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn ingest_task(
    mut events: broadcast::Receiver<Arc<ChatEvent>>,
    store: LocalStore,
    current_user: String,
    resync: Option<ChannelListUpdater>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => {
                    if let Err(e) = ingest(&store, event, &current_user).await {
                        if matches!(e, CoreError::Store(_)) {
                            error!(error = %e, "store unavailable, event ingestion stopped");
                            break;
                        }
                        warn!(error = %e, "event could not be applied");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event ingestion lagged");
                    if let Some(updater) = &resync {
                        tokio::spawn(resync_queries(
                            store.clone(),
                            updater.clone(),
                            cancel.clone(),
                        ));
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("event ingestion stopped");
}

/// Re-fetch the first page of every stored query. Pages union into the
/// stored membership, so channels already listed stay listed.
async fn resync_queries(
    store: LocalStore,
    updater: ChannelListUpdater,
    cancel: CancellationToken,
) {
    let queries: Vec<ChannelListQuery> = store
        .snapshot()
        .stored_queries()
        .map(|stored| ChannelListQuery::new(stored.filter.clone()))
        .collect();
    info!(queries = queries.len(), "re-fetching stored queries after missed events");

    for query in queries {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = updater.update(&query) => result,
        };
        if let Err(e) = result {
            warn!(error = %e, digest = %query.digest(), "query resync failed");
        }
    }
}

async fn ingest(
    store: &LocalStore,
    event: Arc<ChatEvent>,
    current_user: &str,
) -> Result<(), CoreError> {
    if !is_relevant(&event) {
        trace!(?event, "ignoring event");
        return Ok(());
    }
    let me = current_user.to_owned();
    store.write(move |state| apply_event(state, &event, &me)).await
}
