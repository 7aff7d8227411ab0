// ── Channel list controller ──

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::FetchCompletion;
use super::feed::{Feed, Publisher};
use crate::error::CoreError;
use crate::model::{Channel, ChannelListQuery, Pagination};
use crate::store::{Change, LiveView, LocalStore, diff};
use crate::worker::ChannelListUpdater;

/// What a [`ChannelListController`] tells its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelListEvent {
    /// The listed channels changed. The first event after a start lists
    /// the cached result set as inserts.
    Changed(Vec<Change<Channel>>),
    WillStartFetching,
    DidStopFetching { error: Option<String> },
}

struct FetchRequest {
    query: ChannelListQuery,
    done: oneshot::Sender<Result<(), CoreError>>,
}

struct Running {
    cancel: CancellationToken,
    requests: mpsc::UnboundedSender<FetchRequest>,
}

/// Live, sorted list of the channels a query matches.
pub struct ChannelListController {
    query: ChannelListQuery,
    store: LocalStore,
    updater: ChannelListUpdater,
    feed: Feed<ChannelListEvent>,
    next_page: Pagination,
    running: Option<Running>,
}

impl ChannelListController {
    /// Create a stopped controller and the receiving end of its feed.
    pub fn new(
        query: ChannelListQuery,
        store: LocalStore,
        updater: ChannelListUpdater,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelListEvent>) {
        let (feed, events) = Feed::new();
        let next_page = query.pagination.next();
        let controller = Self {
            query,
            store,
            updater,
            feed,
            next_page,
            running: None,
        };
        (controller, events)
    }

    pub fn query(&self) -> &ChannelListQuery {
        &self.query
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Cached channels for the query, in query order.
    pub fn channels(&self) -> Vec<Channel> {
        self.store.snapshot().query_channels(&self.query)
    }

    /// Publish the cached list, start observing the store, and fetch the
    /// query's first page. No-op while already running.
    pub fn start_updating(&mut self) -> FetchCompletion {
        if self.running.is_some() {
            debug!(digest = %self.query.digest(), "controller already running");
            return FetchCompletion::ready(Ok(()));
        }

        let view = self.store.observe_query(self.query.clone());
        let publisher = self.feed.publisher();
        publisher.send(ChannelListEvent::Changed(diff(&[], view.items())));

        let cancel = CancellationToken::new();
        let (requests, request_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(
            view,
            self.updater.clone(),
            request_rx,
            publisher,
            cancel.clone(),
        ));
        self.running = Some(Running { cancel, requests });
        self.next_page = self.query.pagination.next();
        self.fetch(self.query.clone())
    }

    /// Re-fetch the query's first page.
    pub fn refresh(&mut self) -> FetchCompletion {
        self.next_page = self.query.pagination.next();
        self.fetch(self.query.clone())
    }

    /// Fetch the page after the last one loaded and add it to the list.
    pub fn load_next_page(&mut self) -> FetchCompletion {
        let query = self.query.clone().with_pagination(self.next_page);
        let completion = self.fetch(query);
        if self.running.is_some() {
            self.next_page = self.next_page.next();
        }
        completion
    }

    /// Stop observing and fetching. Nothing is published after this
    /// returns.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            self.feed.close_epoch();
            running.cancel.cancel();
        }
    }

    fn fetch(&self, query: ChannelListQuery) -> FetchCompletion {
        let Some(running) = &self.running else {
            return FetchCompletion::ready(Err(CoreError::ControllerStopped));
        };
        let (done, completion) = FetchCompletion::pending();
        // A closed queue drops `done`, which resolves the completion as
        // cancelled.
        let _ = running.requests.send(FetchRequest { query, done });
        completion
    }
}

impl Drop for ChannelListController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ChannelListController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelListController")
            .field("query", &self.query)
            .field("running", &self.running.is_some())
            .finish_non_exhaustive()
    }
}

// ── Controller task ──────────────────────────────────────────────────

type FetchResult = (Result<(), CoreError>, oneshot::Sender<Result<(), CoreError>>);

async fn run(
    mut view: LiveView<Channel>,
    updater: ChannelListUpdater,
    mut requests: mpsc::UnboundedReceiver<FetchRequest>,
    publisher: Publisher<ChannelListEvent>,
    cancel: CancellationToken,
) {
    let (results_tx, mut results) = mpsc::unbounded_channel::<FetchResult>();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(request) = requests.recv() => {
                publisher.send(ChannelListEvent::WillStartFetching);
                let updater = updater.clone();
                let results_tx = results_tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let result = tokio::select! {
                        biased;
                        () = cancel.cancelled() => Err(CoreError::Cancelled),
                        result = updater.update(&request.query) => result.map(|_| ()),
                    };
                    let _ = results_tx.send((result, request.done));
                });
            }
            Some((result, done)) = results.recv() => {
                // Publish the fetch's own write before reporting it done.
                let changes = view.sync();
                if !changes.is_empty() {
                    publisher.send(ChannelListEvent::Changed(changes));
                }
                publisher.send(ChannelListEvent::DidStopFetching {
                    error: result.as_ref().err().map(ToString::to_string),
                });
                let _ = done.send(result);
            }
            changes = view.changed() => match changes {
                Some(changes) => {
                    publisher.send(ChannelListEvent::Changed(changes));
                }
                None => break,
            },
        }
    }
    debug!("channel list controller stopped");
}
