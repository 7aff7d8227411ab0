// ── Live views ──
//
// A live view pairs a selector over the store state with the last list it
// produced. After every committed write it re-runs the selector and hands
// back the diff, skipping commits that did not change its result.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use super::diff::{Change, Keyed, diff};
use super::state::StoreState;

type Selector<T> = Box<dyn Fn(&StoreState) -> Vec<T> + Send + Sync>;

/// A store-backed, ordered result set that reports its own changes.
pub struct LiveView<T> {
    state: Arc<ArcSwap<StoreState>>,
    version: watch::Receiver<u64>,
    select: Selector<T>,
    current: Vec<T>,
}

impl<T: Keyed + Clone + PartialEq> LiveView<T> {
    pub(crate) fn new(
        state: Arc<ArcSwap<StoreState>>,
        mut version: watch::Receiver<u64>,
        select: Selector<T>,
    ) -> Self {
        // Mark the current version seen before reading so a commit racing
        // with construction is still reported.
        version.borrow_and_update();
        let current = select(&state.load());
        Self {
            state,
            version,
            select,
            current,
        }
    }

    /// The result set as of the last reported change.
    pub fn items(&self) -> &[T] {
        &self.current
    }

    /// Wait for the next commit that changes the result set.
    ///
    /// Returns `None` once the store has shut down.
    pub async fn changed(&mut self) -> Option<Vec<Change<T>>> {
        loop {
            self.version.changed().await.ok()?;
            self.version.borrow_and_update();
            let changes = self.recompute();
            if !changes.is_empty() {
                return Some(changes);
            }
        }
    }

    /// Catch up with the latest commit without waiting. Returns an empty
    /// list when nothing relevant changed.
    pub fn sync(&mut self) -> Vec<Change<T>> {
        if !self.version.has_changed().unwrap_or(false) {
            return Vec::new();
        }
        self.version.borrow_and_update();
        self.recompute()
    }

    fn recompute(&mut self) -> Vec<Change<T>> {
        let next = (self.select)(&self.state.load());
        let changes = diff(&self.current, &next);
        self.current = next;
        changes
    }
}

impl<T> std::fmt::Debug for LiveView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveView")
            .field("len", &self.current.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chatsync_api::models::{ChannelPayload, UserPayload};
    use tokio_test::{assert_pending, assert_ready};

    use super::*;
    use crate::error::CoreError;
    use crate::model::Channel;
    use crate::store::LocalStore;

    fn add_channel(raw: &'static str) -> impl FnOnce(&mut StoreState) -> Result<(), CoreError> {
        move |state| state.upsert_channel(&ChannelPayload::with_cid(raw)).map(|_| ())
    }

    fn all_channels(store: &LocalStore) -> LiveView<Channel> {
        store.observe(|state| state.channels().cloned().collect())
    }

    #[tokio::test]
    async fn irrelevant_commits_are_skipped() {
        let store = LocalStore::in_memory();
        let mut view = all_channels(&store);

        {
            let mut changed = tokio_test::task::spawn(view.changed());
            assert_pending!(changed.poll());

            store
                .write(|state| {
                    state.upsert_user(&UserPayload::with_id("u1"));
                    Ok(())
                })
                .await
                .unwrap();
            assert_pending!(changed.poll());

            store.write(add_channel("messaging:c1")).await.unwrap();
            let changes = assert_ready!(changed.poll()).unwrap();
            assert!(matches!(&changes[..], [Change::Added { index: 0, .. }]));
        }
        assert_eq!(view.items().len(), 1);
    }

    #[tokio::test]
    async fn sync_catches_up_without_waiting() {
        let store = LocalStore::in_memory();
        let mut view = all_channels(&store);
        assert!(view.sync().is_empty());

        store.write(add_channel("messaging:c1")).await.unwrap();
        store.write(add_channel("messaging:c2")).await.unwrap();

        let changes = view.sync();
        assert_eq!(changes.len(), 2);
        assert!(view.sync().is_empty());
    }
}
