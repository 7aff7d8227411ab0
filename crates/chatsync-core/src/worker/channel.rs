// ── Single-channel query worker ──

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use chatsync_api::models::ChannelStatePayload;
use chatsync_api::{Endpoint, RequestClient, request};

use super::apply::apply_channel_state;
use crate::error::CoreError;
use crate::model::{Channel, ChannelId};
use crate::store::LocalStore;

/// Fetches one channel with its members and writes it into the store.
#[derive(Clone)]
pub struct ChannelUpdater {
    client: Arc<dyn RequestClient>,
    store: LocalStore,
}

impl ChannelUpdater {
    pub fn new(client: Arc<dyn RequestClient>, store: LocalStore) -> Self {
        Self { client, store }
    }

    /// Fetch `cid` and apply it. Stored query filters are re-evaluated
    /// against the fresh copy.
    pub async fn update(&self, cid: &ChannelId) -> Result<Channel, CoreError> {
        let endpoint = Endpoint::post(format!("channels/{}/{}/query", cid.kind(), cid.id()))
            .with_body(&json!({ "state": true, "watch": true, "presence": false }))?
            .requiring_connection_id();

        let payload: ChannelStatePayload = request(self.client.as_ref(), endpoint)
            .await
            .map_err(|e| {
                warn!(error = %e, %cid, "channel fetch failed");
                CoreError::from(e)
            })?;

        let requested = cid.clone();
        self.store
            .write(move |state| {
                let cid = apply_channel_state(state, &payload)?;
                if cid != requested {
                    warn!(%requested, returned = %cid, "channel fetch returned a different channel");
                }
                state.reevaluate_queries(&cid);
                state
                    .channel(&cid)
                    .cloned()
                    .ok_or_else(|| CoreError::ChannelNotFound { cid: cid.to_string() })
            })
            .await
    }
}

impl std::fmt::Debug for ChannelUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelUpdater").finish_non_exhaustive()
    }
}
