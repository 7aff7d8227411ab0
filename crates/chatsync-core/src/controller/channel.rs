// ── Single channel controller ──

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::feed::{Feed, Publisher};
use super::{EntityChange, FetchCompletion};
use crate::error::CoreError;
use crate::model::{Channel, ChannelId, Member, Message};
use crate::store::{Change, LiveView, LocalStore, diff};
use crate::worker::ChannelUpdater;

/// What a [`ChannelController`] tells its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    ChannelChanged(EntityChange<Channel>),
    /// Member list changes, ordered by user id. The first event after a
    /// start lists the cached members as inserts.
    MembersChanged(Vec<Change<Member>>),
    /// Message list changes, oldest first. Locally composed messages show
    /// up here before the server has seen them.
    MessagesChanged(Vec<Change<Message>>),
    WillStartFetching,
    DidStopFetching { error: Option<String> },
}

struct Running {
    cancel: CancellationToken,
    requests: mpsc::UnboundedSender<oneshot::Sender<Result<(), CoreError>>>,
}

/// Live view of one channel, its members and its messages.
pub struct ChannelController {
    cid: ChannelId,
    store: LocalStore,
    updater: ChannelUpdater,
    feed: Feed<ChannelEvent>,
    running: Option<Running>,
}

impl ChannelController {
    pub fn new(
        cid: ChannelId,
        store: LocalStore,
        updater: ChannelUpdater,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (feed, events) = Feed::new();
        let controller = Self {
            cid,
            store,
            updater,
            feed,
            running: None,
        };
        (controller, events)
    }

    pub fn cid(&self) -> &ChannelId {
        &self.cid
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn channel(&self) -> Option<Channel> {
        self.store.load_channel(&self.cid)
    }

    pub fn members(&self) -> Vec<Member> {
        self.store.load_members(&self.cid)
    }

    pub fn messages(&self) -> Vec<Message> {
        self.store.load_messages(&self.cid)
    }

    /// Publish the cached channel, members and messages, start observing,
    /// and fetch the channel. No-op while already running.
    pub fn start_updating(&mut self) -> FetchCompletion {
        if self.running.is_some() {
            debug!(cid = %self.cid, "controller already running");
            return FetchCompletion::ready(Ok(()));
        }

        let channel = self.store.observe_channel(self.cid.clone());
        let members = self.store.observe_members(self.cid.clone());
        let messages = self.store.observe_messages(self.cid.clone());
        let publisher = self.feed.publisher();
        if let Some(initial) = channel.items().first() {
            publisher.send(ChannelEvent::ChannelChanged(EntityChange::Created(initial.clone())));
        }
        publisher.send(ChannelEvent::MembersChanged(diff(&[], members.items())));
        publisher.send(ChannelEvent::MessagesChanged(diff(&[], messages.items())));

        let cancel = CancellationToken::new();
        let (requests, request_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(
            self.cid.clone(),
            Views {
                channel,
                members,
                messages,
            },
            self.updater.clone(),
            request_rx,
            publisher,
            cancel.clone(),
        ));
        self.running = Some(Running { cancel, requests });
        self.refresh()
    }

    /// Re-fetch the channel.
    pub fn refresh(&self) -> FetchCompletion {
        let Some(running) = &self.running else {
            return FetchCompletion::ready(Err(CoreError::ControllerStopped));
        };
        let (done, completion) = FetchCompletion::pending();
        let _ = running.requests.send(done);
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
}

impl Drop for ChannelController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ChannelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelController")
            .field("cid", &self.cid)
            .field("running", &self.running.is_some())
            .finish_non_exhaustive()
    }
}

// ── Controller task ──────────────────────────────────────────────────

struct Views {
    channel: LiveView<Channel>,
    members: LiveView<Member>,
    messages: LiveView<Message>,
}

impl Views {
    fn publish_pending(&mut self, publisher: &Publisher<ChannelEvent>) {
        if let Some(change) = EntityChange::from_changes(self.channel.sync()) {
            publisher.send(ChannelEvent::ChannelChanged(change));
        }
        let members = self.members.sync();
        if !members.is_empty() {
            publisher.send(ChannelEvent::MembersChanged(members));
        }
        let messages = self.messages.sync();
        if !messages.is_empty() {
            publisher.send(ChannelEvent::MessagesChanged(messages));
        }
    }
}

type FetchResult = (Result<(), CoreError>, oneshot::Sender<Result<(), CoreError>>);

async fn run(
    cid: ChannelId,
    mut views: Views,
    updater: ChannelUpdater,
    mut requests: mpsc::UnboundedReceiver<oneshot::Sender<Result<(), CoreError>>>,
    publisher: Publisher<ChannelEvent>,
    cancel: CancellationToken,
) {
    let (results_tx, mut results) = mpsc::unbounded_channel::<FetchResult>();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(done) = requests.recv() => {
                publisher.send(ChannelEvent::WillStartFetching);
                let updater = updater.clone();
                let results_tx = results_tx.clone();
                let cancel = cancel.clone();
                let cid = cid.clone();
                tokio::spawn(async move {
                    let result = tokio::select! {
                        biased;
                        () = cancel.cancelled() => Err(CoreError::Cancelled),
                        result = updater.update(&cid) => result.map(|_| ()),
                    };
                    let _ = results_tx.send((result, done));
                });
            }
            Some((result, done)) = results.recv() => {
                views.publish_pending(&publisher);
                publisher.send(ChannelEvent::DidStopFetching {
                    error: result.as_ref().err().map(ToString::to_string),
                });
                let _ = done.send(result);
            }
            changes = views.channel.changed() => match changes {
                Some(changes) => {
                    if let Some(change) = EntityChange::from_changes(changes) {
                        publisher.send(ChannelEvent::ChannelChanged(change));
                    }
                }
                None => break,
            },
            changes = views.members.changed() => match changes {
                Some(changes) => {
                    publisher.send(ChannelEvent::MembersChanged(changes));
                }
                None => break,
            },
            changes = views.messages.changed() => match changes {
                Some(changes) => {
                    publisher.send(ChannelEvent::MessagesChanged(changes));
                }
                None => break,
            },
        }
    }
    debug!(%cid, "channel controller stopped");
}
