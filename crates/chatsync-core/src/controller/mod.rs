// ── Controllers ──
//
// Presentation-facing handles. A controller loads its slice of the local
// store synchronously, kicks off a remote fetch, and publishes every later
// change to its slice as an ordered event on an unbounded feed.
//
// Starting a running controller is a no-op; `refresh()` re-fetches.
// `stop()` (or drop) ends delivery, and a stopped controller can be
// started again as if for the first time.

mod channel;
mod channel_list;
mod feed;

pub use channel::{ChannelController, ChannelEvent};
pub use channel_list::{ChannelListController, ChannelListEvent};

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::CoreError;
use crate::store::Change;

/// Change to a single entity a controller observes.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityChange<T> {
    Created(T),
    Updated(T),
    Removed(T),
}

impl<T> EntityChange<T> {
    pub fn item(&self) -> &T {
        match self {
            Self::Created(item) | Self::Updated(item) | Self::Removed(item) => item,
        }
    }

    /// Collapse a diff of a zero-or-one item list.
    pub(crate) fn from_changes(changes: Vec<Change<T>>) -> Option<Self> {
        // An identity swap shows up as remove + add; the add is the result.
        changes.into_iter().fold(None, |acc, change| {
            let next = match change {
                Change::Added { item, .. } => Self::Created(item),
                Change::Updated { item, .. } | Change::Moved { item, .. } => Self::Updated(item),
                Change::Removed { item, .. } => Self::Removed(item),
            };
            match (acc, next) {
                (Some(Self::Removed(_)), Self::Created(item)) => Some(Self::Updated(item)),
                (_, next) => Some(next),
            }
        })
    }
}

/// Resolves when a fetch started by a controller finishes.
#[must_use = "the fetch outcome is only reported when awaited"]
pub struct FetchCompletion {
    inner: CompletionInner,
}

enum CompletionInner {
    Ready(Option<Result<(), CoreError>>),
    Pending(oneshot::Receiver<Result<(), CoreError>>),
}

impl FetchCompletion {
    pub(crate) fn ready(result: Result<(), CoreError>) -> Self {
        Self {
            inner: CompletionInner::Ready(Some(result)),
        }
    }

    pub(crate) fn pending() -> (oneshot::Sender<Result<(), CoreError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                inner: CompletionInner::Pending(rx),
            },
        )
    }
}

impl Future for FetchCompletion {
    type Output = Result<(), CoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            CompletionInner::Ready(result) => Poll::Ready(result.take().unwrap_or(Ok(()))),
            // Dropped unanswered: the controller stopped mid-fetch.
            CompletionInner::Pending(rx) => Pin::new(rx)
                .poll(cx)
                .map(|r| r.unwrap_or(Err(CoreError::Cancelled))),
        }
    }
}

impl std::fmt::Debug for FetchCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.inner {
            CompletionInner::Ready(_) => "ready",
            CompletionInner::Pending(_) => "pending",
        };
        f.debug_struct("FetchCompletion").field("state", &state).finish()
    }
}
