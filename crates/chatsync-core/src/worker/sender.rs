// ── Outbound-message worker ──
//
// Optimistic send: the message is stored locally before the network round
// trip, so live views show it immediately. A failed send is parked as
// `SendingFailed` until the caller retries; nothing is retried on its own.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use chatsync_api::models::{ExtraFields, MessageResponse, OutgoingMessage, UserPayload};
use chatsync_api::{Endpoint, RequestClient, request};

use crate::error::CoreError;
use crate::model::{ChannelId, ExtraData, LocalMessageState, Message};
use crate::store::LocalStore;

#[derive(Clone)]
pub struct MessageSender {
    client: Arc<dyn RequestClient>,
    store: LocalStore,
    current_user: String,
}

impl MessageSender {
    pub fn new(
        client: Arc<dyn RequestClient>,
        store: LocalStore,
        current_user: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            current_user: current_user.into(),
        }
    }

    /// Store `text` as a pending message in `cid`, then send it.
    ///
    /// Resolves with the acknowledged message. On failure the local copy
    /// stays in the store as `SendingFailed`.
    pub async fn send(
        &self,
        cid: &ChannelId,
        text: impl Into<String>,
        extra: ExtraFields,
    ) -> Result<Message, CoreError> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            cid: cid.clone(),
            author_id: self.current_user.clone(),
            text: text.into(),
            kind: None,
            created_at: Some(Utc::now()),
            updated_at: None,
            local_state: Some(LocalMessageState::Pending),
            extra_data: ExtraData::from_fields(&extra),
        };
        let id = message.id.clone();
        let author = self.current_user.clone();
        self.store
            .write(move |state| {
                if state.channel(&message.cid).is_none() {
                    return Err(CoreError::ChannelNotFound {
                        cid: message.cid.to_string(),
                    });
                }
                state.upsert_user(&UserPayload::with_id(author));
                state.put_local_message(message);
                Ok(())
            })
            .await?;
        debug!(message_id = %id, %cid, "message stored as pending");

        self.transmit(&id).await
    }

    /// Send a message that previously failed.
    pub async fn retry(&self, message_id: &str) -> Result<Message, CoreError> {
        match self.store.load_message(message_id) {
            Some(message) if message.local_state.is_some() => self.transmit(message_id).await,
            Some(message) => Ok(message),
            None => Err(CoreError::MessageNotFound {
                id: message_id.to_owned(),
            }),
        }
    }

    async fn transmit(&self, message_id: &str) -> Result<Message, CoreError> {
        let id = message_id.to_owned();
        let outgoing = self
            .store
            .write(move |state| {
                let message = state
                    .message_mut(&id)
                    .ok_or_else(|| CoreError::MessageNotFound { id: id.clone() })?;
                message.local_state = Some(LocalMessageState::Sending);
                Ok((
                    message.cid.clone(),
                    OutgoingMessage {
                        id: message.id.clone(),
                        text: message.text.clone(),
                        extra: message.extra_data.fields(),
                    },
                ))
            })
            .await?;
        let (cid, outgoing) = outgoing;

        let endpoint = Endpoint::post(format!("channels/{}/{}/message", cid.kind(), cid.id()))
            .with_body(&serde_json::json!({ "message": outgoing }))?;
        let id = outgoing.id;

        match request::<MessageResponse>(self.client.as_ref(), endpoint).await {
            Ok(response) => {
                let local_id = id.clone();
                self.store
                    .write(move |state| {
                        let server_id = response.message.id.clone();
                        if server_id != local_id {
                            state.remove_message(&local_id);
                        }
                        state.upsert_message(&cid, &response.message);
                        state
                            .message(&server_id)
                            .cloned()
                            .ok_or(CoreError::MessageNotFound { id: server_id })
                    })
                    .await
            }
            Err(e) => {
                warn!(error = %e, message_id = %id, "message send failed");
                let failed = id.clone();
                self.store
                    .write(move |state| {
                        if let Some(message) = state.message_mut(&failed) {
                            message.local_state = Some(LocalMessageState::SendingFailed);
                        }
                        Ok(())
                    })
                    .await?;
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSender")
            .field("current_user", &self.current_user)
            .finish_non_exhaustive()
    }
}
