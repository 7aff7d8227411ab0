// ── ChatClient facade ──
//
// Wires the request client, the realtime transport and the local store
// together and hands out controllers and workers bound to them. Holds the
// event-ingestion worker for the lifetime of a session and tears the
// session down if the store reports a fatal persistence failure.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use chatsync_api::models::UserPayload;
use chatsync_api::{
    ConnectionState, HttpClient, RealtimeClient, RealtimeConfig, RequestClient, TransportConfig,
};

use crate::config::{ClientConfig, CurrentUser};
use crate::controller::{ChannelController, ChannelEvent, ChannelListController, ChannelListEvent};
use crate::error::{CoreError, StoreError};
use crate::model::{ChannelId, ChannelListQuery};
use crate::store::LocalStore;
use crate::worker::{ChannelListUpdater, ChannelUpdater, EventHandler, MessageSender};

/// Entry point of the sync engine. Cheaply cloneable.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<ChatClientInner>,
}

struct ChatClientInner {
    user: CurrentUser,
    requests: Arc<dyn RequestClient>,
    realtime: RealtimeClient,
    store: LocalStore,
    session: Mutex<Option<Session>>,
}

/// Background work tied to one `connect()`/`disconnect()` cycle.
struct Session {
    cancel: CancellationToken,
    events: EventHandler,
    fatal_watch: JoinHandle<()>,
}

impl ChatClient {
    /// Build the production stack from `config` and open the store.
    /// Does not connect; call [`connect()`](Self::connect).
    pub async fn new(config: ClientConfig) -> Result<Self, CoreError> {
        let realtime = RealtimeClient::with_tungstenite(RealtimeConfig {
            url: config.ws_url.clone(),
            api_key: config.api_key.clone(),
            user_id: config.user.id.clone(),
            token: config.token.clone(),
            reconnect: config.reconnect.clone(),
            ping_interval: config.ping_interval,
        })?;

        let transport = TransportConfig {
            tls: config.tls.clone(),
            timeout: config.timeout,
        };
        let mut http = HttpClient::new(
            &config.base_url,
            config.api_key.clone(),
            config.token.clone(),
            &transport,
        )?;
        http.set_connection_id_provider(Arc::new(realtime.clone()));

        let store = LocalStore::open(&config.storage, &config.user.id).await?;
        Ok(Self::from_parts(config.user, Arc::new(http), realtime, store))
    }

    /// Assemble a client from already-built parts.
    pub fn from_parts(
        user: CurrentUser,
        requests: Arc<dyn RequestClient>,
        realtime: RealtimeClient,
        store: LocalStore,
    ) -> Self {
        Self {
            inner: Arc::new(ChatClientInner {
                user,
                requests,
                realtime,
                store,
                session: Mutex::new(None),
            }),
        }
    }

    pub fn current_user(&self) -> &CurrentUser {
        &self.inner.user
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    pub fn realtime(&self) -> &RealtimeClient {
        &self.inner.realtime
    }

    // ── Session lifecycle ────────────────────────────────────────────

    /// Start event ingestion and open the realtime connection. No-op if
    /// already connected.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if let Some(err) = self.fatal_error() {
            return Err(err.into());
        }

        let mut session = self.inner.session.lock().await;
        if session.is_some() {
            debug!("connect ignored, session active");
            return Ok(());
        }

        let me = self.me_payload();
        self.inner
            .store
            .write(move |state| {
                state.upsert_user(&me);
                Ok(())
            })
            .await?;

        // Subscribe before connecting so no early event is missed.
        let events = EventHandler::spawn_with_resync(
            self.inner.realtime.subscribe(),
            self.inner.store.clone(),
            self.inner.user.id.clone(),
            self.channel_list_updater(),
        );
        let cancel = CancellationToken::new();
        let fatal_watch = tokio::spawn(watch_fatal(
            self.inner.store.fatal(),
            self.inner.realtime.clone(),
            cancel.clone(),
        ));
        *session = Some(Session {
            cancel,
            events,
            fatal_watch,
        });

        self.inner.realtime.connect();
        info!(user = %self.inner.user.id, "chat client connected");
        Ok(())
    }

    /// Close the realtime connection and stop event ingestion.
    pub async fn disconnect(&self) {
        let Some(session) = self.inner.session.lock().await.take() else {
            return;
        };
        self.inner.realtime.disconnect("client disconnect");
        session.cancel.cancel();
        session.events.shutdown().await;
        let _ = session.fatal_watch.await;
        debug!("chat client disconnected");
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.realtime.watch_state()
    }

    /// The persistence failure that closed the store, if any.
    pub fn fatal_error(&self) -> Option<StoreError> {
        self.inner.store.fatal().borrow().clone()
    }

    // ── Controllers and workers ──────────────────────────────────────

    pub fn channel_list_controller(
        &self,
        query: ChannelListQuery,
    ) -> (
        ChannelListController,
        tokio::sync::mpsc::UnboundedReceiver<ChannelListEvent>,
    ) {
        ChannelListController::new(query, self.inner.store.clone(), self.channel_list_updater())
    }

    pub fn channel_controller(
        &self,
        cid: ChannelId,
    ) -> (
        ChannelController,
        tokio::sync::mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        ChannelController::new(cid, self.inner.store.clone(), self.channel_updater())
    }

    pub fn channel_list_updater(&self) -> ChannelListUpdater {
        ChannelListUpdater::new(Arc::clone(&self.inner.requests), self.inner.store.clone())
    }

    pub fn channel_updater(&self) -> ChannelUpdater {
        ChannelUpdater::new(Arc::clone(&self.inner.requests), self.inner.store.clone())
    }

    pub fn message_sender(&self) -> MessageSender {
        MessageSender::new(
            Arc::clone(&self.inner.requests),
            self.inner.store.clone(),
            self.inner.user.id.clone(),
        )
    }

    fn me_payload(&self) -> UserPayload {
        let mut me = UserPayload::with_id(self.inner.user.id.clone());
        if let Some(name) = &self.inner.user.name {
            me.extra
                .insert("name".into(), serde_json::Value::String(name.clone()));
        }
        me
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("user", &self.inner.user.id)
            .finish_non_exhaustive()
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Disconnect the transport as soon as the store closes on a fatal error.
async fn watch_fatal(
    mut fatal: watch::Receiver<Option<StoreError>>,
    realtime: RealtimeClient,
    cancel: CancellationToken,
) {
    let failure = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = fatal.wait_for(Option::is_some) => match result {
            Ok(err) => err.as_ref().map(ToString::to_string),
            Err(_) => return,
        },
    };
    if let Some(message) = failure {
        error!(error = %message, "local store failed; ending session");
        realtime.disconnect("local store failure");
    }
}
