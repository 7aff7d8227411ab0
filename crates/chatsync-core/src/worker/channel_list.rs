// ── Channel-list query worker ──

use std::sync::Arc;

use tracing::{debug, warn};

use chatsync_api::models::ChannelListPayload;
use chatsync_api::{Endpoint, RequestClient, request};

use super::apply::apply_channel_list;
use crate::error::CoreError;
use crate::model::{ChannelListQuery, QueryMembership};
use crate::store::LocalStore;

/// Fetches channel-list queries and writes the results into the store.
#[derive(Clone)]
pub struct ChannelListUpdater {
    client: Arc<dyn RequestClient>,
    store: LocalStore,
}

impl ChannelListUpdater {
    pub fn new(client: Arc<dyn RequestClient>, store: LocalStore) -> Self {
        Self { client, store }
    }

    /// Fetch one page of `query` and apply it in a single store write.
    ///
    /// On failure the store, including the query's membership, is left as
    /// it was.
    pub async fn update(&self, query: &ChannelListQuery) -> Result<QueryMembership, CoreError> {
        let mut endpoint = Endpoint::post("channels").with_body(&query.to_wire())?;
        if query.watch {
            endpoint = endpoint.requiring_connection_id();
        }

        let payload: ChannelListPayload = match request(self.client.as_ref(), endpoint).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, digest = %query.digest(), "channel list fetch failed");
                return Err(e.into());
            }
        };

        let query = query.clone();
        let page = self
            .store
            .write(move |state| Ok(apply_channel_list(state, &query, &payload)))
            .await?;
        debug!(channels = page.len(), "channel list page applied");
        Ok(page)
    }
}

impl std::fmt::Debug for ChannelListUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelListUpdater").finish_non_exhaustive()
    }
}
