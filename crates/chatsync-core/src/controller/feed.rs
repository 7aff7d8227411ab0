// ── Controller change feed ──
//
// An unbounded queue from a controller to its subscriber. Each start of
// the controller publishes under a new epoch; stopping bumps the epoch so
// a publisher from a stopped run can no longer enqueue anything.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

struct FeedInner<E> {
    tx: mpsc::UnboundedSender<E>,
    epoch: u64,
}

pub(crate) struct Feed<E> {
    inner: Arc<Mutex<FeedInner<E>>>,
}

impl<E> Feed<E> {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = Self {
            inner: Arc::new(Mutex::new(FeedInner { tx, epoch: 0 })),
        };
        (feed, rx)
    }

    /// A publisher bound to the current epoch.
    pub(crate) fn publisher(&self) -> Publisher<E> {
        Publisher {
            inner: Arc::clone(&self.inner),
            epoch: lock(&self.inner).epoch,
        }
    }

    /// Invalidate every outstanding publisher.
    pub(crate) fn close_epoch(&self) {
        lock(&self.inner).epoch += 1;
    }
}

pub(crate) struct Publisher<E> {
    inner: Arc<Mutex<FeedInner<E>>>,
    epoch: u64,
}

impl<E> Publisher<E> {
    /// Enqueue `event`. Returns `false` once this publisher's epoch has
    /// ended or the subscriber is gone.
    pub(crate) fn send(&self, event: E) -> bool {
        let inner = lock(&self.inner);
        inner.epoch == self.epoch && inner.tx.send(event).is_ok()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stale_publishers_are_silenced() {
        let (feed, mut rx) = Feed::new();
        let first = feed.publisher();
        assert!(first.send(1));
        feed.close_epoch();
        assert!(!first.send(2));

        let second = feed.publisher();
        assert!(second.send(3));
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), 3);
        assert!(rx.try_recv().is_err());
    }
}
