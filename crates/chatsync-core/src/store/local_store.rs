// ── Local store ──
//
// One writer task owns mutation. `write()` enqueues a mutator; the writer
// runs it against a copy of the current state, persists the copy when the
// store is disk-backed, then publishes it as the new snapshot and bumps
// the version watch. Readers load snapshots lock-free.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use super::state::StoreState;
use super::view::LiveView;
use crate::config::StorageMode;
use crate::error::{CoreError, StoreError};
use crate::model::{Channel, ChannelId, ChannelListQuery, Member, Message, User};

const STORE_FILE: &str = "store.json";

type Job = Box<dyn FnOnce(&mut StoreState) -> Completion + Send>;

/// Outcome of running one mutator: whether to commit, and how to report
/// the final result to the caller.
struct Completion {
    commit: bool,
    reply: Box<dyn FnOnce(Result<(), StoreError>) + Send>,
}

/// Handle to the local store. Cheap to clone; all clones share one writer.
#[derive(Clone)]
pub struct LocalStore {
    state: Arc<ArcSwap<StoreState>>,
    version: watch::Receiver<u64>,
    fatal: watch::Receiver<Option<StoreError>>,
    jobs: mpsc::UnboundedSender<Job>,
}

impl LocalStore {
    /// Ephemeral store; nothing survives the process.
    pub fn in_memory() -> Self {
        Self::start(StoreState::default(), None)
    }

    /// Open the store for `user_id` in the given mode. A disk-backed store
    /// loads `<root>/<user dir>/store.json` if present.
    pub async fn open(mode: &StorageMode, user_id: &str) -> Result<Self, StoreError> {
        match mode {
            StorageMode::InMemory => Ok(Self::in_memory()),
            StorageMode::OnDisk { root } => {
                let path = store_path(root, user_id);
                let initial = load(&path).await?;
                info!(path = %path.display(), version = initial.version(), "opened local store");
                Ok(Self::start(initial, Some(path)))
            }
        }
    }

    fn start(initial: StoreState, path: Option<PathBuf>) -> Self {
        let state = Arc::new(ArcSwap::from_pointee(initial));
        let (version_tx, version) = watch::channel(state.load().version());
        let (fatal_tx, fatal) = watch::channel(None);
        let (jobs, rx) = mpsc::unbounded_channel();

        let writer = Writer {
            state: Arc::clone(&state),
            version: version_tx,
            fatal: fatal_tx,
            path,
        };
        tokio::spawn(writer.run(rx));

        Self {
            state,
            version,
            fatal,
            jobs,
        }
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Enqueue `mutator`. Mutators run one at a time in enqueue order; the
    /// returned future resolves once the write has committed (or failed).
    ///
    /// A mutator that returns an error leaves the store unchanged.
    pub fn write<R, F>(&self, mutator: F) -> PendingWrite<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut StoreState) -> Result<R, CoreError> + Send + 'static,
    {
        if self.fatal.borrow().is_some() {
            return PendingWrite { rx: None };
        }
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |state| match mutator(state) {
            Ok(value) => Completion {
                commit: true,
                reply: Box::new(move |result| {
                    let _ = tx.send(result.map(|()| value).map_err(CoreError::from));
                }),
            },
            Err(err) => Completion {
                commit: false,
                reply: Box::new(move |_| {
                    let _ = tx.send(Err(err));
                }),
            },
        });
        match self.jobs.send(job) {
            Ok(()) => PendingWrite { rx: Some(rx) },
            Err(_) => PendingWrite { rx: None },
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// The latest committed state.
    pub fn snapshot(&self) -> Arc<StoreState> {
        self.state.load_full()
    }

    pub fn load_channel(&self, cid: &ChannelId) -> Option<Channel> {
        self.state.load().channel(cid).cloned()
    }

    pub fn load_user(&self, id: &str) -> Option<User> {
        self.state.load().user(id).cloned()
    }

    pub fn load_members(&self, cid: &ChannelId) -> Vec<Member> {
        self.state.load().members(cid).into_iter().cloned().collect()
    }

    /// Messages of `cid`, oldest first.
    pub fn load_messages(&self, cid: &ChannelId) -> Vec<Message> {
        self.state.load().messages(cid).into_iter().cloned().collect()
    }

    pub fn load_message(&self, id: &str) -> Option<Message> {
        self.state.load().message(id).cloned()
    }

    pub fn query_membership(&self, query: &ChannelListQuery) -> crate::model::QueryMembership {
        self.state.load().query_membership(&query.digest())
    }

    /// Version of the latest committed write.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Set once a persistence failure has closed the store.
    pub fn fatal(&self) -> watch::Receiver<Option<StoreError>> {
        self.fatal.clone()
    }

    // ── Live views ───────────────────────────────────────────────────

    /// Observe an arbitrary ordered selection of the store.
    pub fn observe<T, F>(&self, select: F) -> LiveView<T>
    where
        T: super::diff::Keyed + Clone + PartialEq,
        F: Fn(&StoreState) -> Vec<T> + Send + Sync + 'static,
    {
        LiveView::new(Arc::clone(&self.state), self.version.clone(), Box::new(select))
    }

    /// The channels `query` lists, in query order.
    pub fn observe_query(&self, query: ChannelListQuery) -> LiveView<Channel> {
        self.observe(move |state| state.query_channels(&query))
    }

    /// Zero or one item: the channel row itself.
    pub fn observe_channel(&self, cid: ChannelId) -> LiveView<Channel> {
        self.observe(move |state| state.channel(&cid).cloned().into_iter().collect())
    }

    pub fn observe_members(&self, cid: ChannelId) -> LiveView<Member> {
        self.observe(move |state| state.members(&cid).into_iter().cloned().collect())
    }

    pub fn observe_messages(&self, cid: ChannelId) -> LiveView<Message> {
        self.observe(move |state| state.messages(&cid).into_iter().cloned().collect())
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// Result of [`LocalStore::write`]. Resolves with `StoreError::Closed` if
/// the store stopped before the write committed.
#[must_use = "a write reports its outcome only when awaited"]
pub struct PendingWrite<R> {
    rx: Option<oneshot::Receiver<Result<R, CoreError>>>,
}

impl<R> Future for PendingWrite<R> {
    type Output = Result<R, CoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            Some(rx) => Pin::new(rx)
                .poll(cx)
                .map(|r| r.unwrap_or_else(|_| Err(StoreError::Closed.into()))),
            None => Poll::Ready(Err(StoreError::Closed.into())),
        }
    }
}

// ── Writer task ──────────────────────────────────────────────────────

struct Writer {
    state: Arc<ArcSwap<StoreState>>,
    version: watch::Sender<u64>,
    fatal: watch::Sender<Option<StoreError>>,
    path: Option<PathBuf>,
}

impl Writer {
    async fn run(self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = jobs.recv().await {
            let mut next = StoreState::clone(&self.state.load());
            let completion = job(&mut next);
            if !completion.commit {
                (completion.reply)(Ok(()));
                continue;
            }

            let version = next.bump_version();
            if let Some(path) = &self.path {
                if let Err(err) = persist(path, &next).await {
                    error!(error = %err, version, "store persistence failed; closing store");
                    self.fatal.send_replace(Some(err.clone()));
                    (completion.reply)(Err(err));
                    // Dropping the queued jobs resolves their callers with `Closed`.
                    jobs.close();
                    while jobs.recv().await.is_some() {}
                    return;
                }
            }

            self.state.store(Arc::new(next));
            self.version.send_replace(version);
            (completion.reply)(Ok(()));
        }
        debug!("store writer stopped");
    }
}

// ── Persistence ──────────────────────────────────────────────────────

/// Per-user store location. Ids that are not plain file names get a
/// digest suffix so two users can never share a directory.
pub(crate) fn store_path(root: &Path, user_id: &str) -> PathBuf {
    let safe = !user_id.is_empty()
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    let dir = if safe {
        user_id.to_owned()
    } else {
        let sanitized: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let digest = format!("{:x}", Sha256::digest(user_id.as_bytes()));
        format!("{sanitized}-{}", &digest[..12])
    };
    root.join(dir).join(STORE_FILE)
}

async fn load(path: &Path) -> Result<StoreState, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Persistence {
            path: path.to_path_buf(),
            message: format!("corrupt store file: {e}"),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreState::default()),
        Err(e) => Err(StoreError::Persistence {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
    }
}

/// Write `state` to `path` atomically: temp file in the same directory,
/// then rename over the target.
async fn persist(path: &Path, state: &StoreState) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
        .await
        .map_err(|e| StoreError::Io(e.to_string()))?
        .map_err(|e| StoreError::Persistence {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chatsync_api::models::{ChannelPayload, UserPayload};

    use super::*;

    #[tokio::test]
    async fn writes_commit_in_enqueue_order() {
        let store = LocalStore::in_memory();
        let first = store.write(|state| {
            state.upsert_user(&UserPayload::with_id("u1"));
            Ok(state.version())
        });
        let second = store.write(|state| Ok(state.user("u1").is_some()));

        assert_eq!(first.await.unwrap(), 0);
        assert!(second.await.unwrap());
        assert_eq!(store.version(), 2);
    }

    #[tokio::test]
    async fn failed_mutator_leaves_state_untouched() {
        let store = LocalStore::in_memory();
        let result = store
            .write(|state| {
                state.upsert_user(&UserPayload::with_id("u1"));
                state.upsert_channel(&ChannelPayload::with_cid("not-a-cid"))
            })
            .await;

        assert!(matches!(result, Err(CoreError::InvalidChannelId(_))));
        assert!(store.load_user("u1").is_none());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn store_paths_are_user_scoped() {
        let root = Path::new("/data");
        assert_eq!(store_path(root, "u1"), Path::new("/data/u1/store.json"));

        let a = store_path(root, "a/b");
        let b = store_path(root, "a_b");
        assert_ne!(a, b);
        assert!(a.starts_with(root));
        let dots = store_path(root, "..");
        assert!(dots.to_string_lossy().starts_with("/data/__-"));
        assert_eq!(dots.parent().unwrap().parent().unwrap(), root);
    }
}
