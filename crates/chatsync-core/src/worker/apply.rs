// ── Apply functions ──
//
// The single translation from wire payloads into store mutations. Fetch
// responses and push events both land here, so a channel looks the same
// in the cache no matter which path delivered it. All functions are
// idempotent: applying the same payload twice leaves the same state.

use tracing::warn;

use chatsync_api::ChatEvent;
use chatsync_api::models::{ChannelListPayload, ChannelStatePayload, MemberPayload, UserPayload};

use crate::error::CoreError;
use crate::model::{ChannelId, ChannelListQuery, MemberId, QueryMembership};
use crate::store::StoreState;

/// Upsert one channel with its members and messages.
pub(crate) fn apply_channel_state(
    state: &mut StoreState,
    payload: &ChannelStatePayload,
) -> Result<ChannelId, CoreError> {
    let cid = state.upsert_channel(&payload.channel)?;
    for member in &payload.members {
        state.upsert_member(&cid, member);
    }
    for message in &payload.messages {
        state.upsert_message(&cid, message);
    }
    Ok(cid)
}

/// Upsert a fetched page of `query` and record its membership.
///
/// Channels whose identity cannot be read are skipped, not fatal to the
/// page.
pub(crate) fn apply_channel_list(
    state: &mut StoreState,
    query: &ChannelListQuery,
    payload: &ChannelListPayload,
) -> QueryMembership {
    let mut page = QueryMembership::new();
    for channel in &payload.channels {
        match apply_channel_state(state, channel) {
            Ok(cid) => {
                page.insert(cid);
            }
            Err(e) => warn!(error = %e, cid = %channel.channel.cid, "skipping unreadable channel"),
        }
    }
    state.apply_query_page(query, page.clone());
    page
}

/// Whether `event` changes the cache at all.
pub(crate) fn is_relevant(event: &ChatEvent) -> bool {
    !matches!(
        event,
        ChatEvent::HealthCheck(_)
            | ChatEvent::TypingStart(_)
            | ChatEvent::TypingStop(_)
            | ChatEvent::Unknown
    )
}

/// Translate one push event into store mutations. `current_user` is the
/// user the session acts as; membership notifications without member
/// details refer to them.
pub(crate) fn apply_event(
    state: &mut StoreState,
    event: &ChatEvent,
    current_user: &str,
) -> Result<(), CoreError> {
    match event {
        ChatEvent::AddedToChannel(body) => {
            let cid = state.upsert_channel(&body.channel)?;
            if body.members.is_empty() {
                let me = MemberPayload::for_user(UserPayload::with_id(current_user));
                state.upsert_member(&cid, &me);
            }
            for member in &body.members {
                state.upsert_member(&cid, member);
            }
            state.reevaluate_queries(&cid);
        }
        ChatEvent::RemovedFromChannel(body) => {
            let cid = match &body.channel {
                Some(channel) => state.upsert_channel(channel)?,
                None => body.cid.parse()?,
            };
            state.remove_member(&MemberId::new(cid.clone(), current_user));
            state.reevaluate_queries(&cid);
        }
        ChatEvent::ChannelUpdated(body) => {
            let cid = state.upsert_channel(&body.channel)?;
            for member in &body.members {
                state.upsert_member(&cid, member);
            }
            state.reevaluate_queries(&cid);
        }
        ChatEvent::ChannelDeleted(body) => {
            let cid: ChannelId = body.cid.parse()?;
            state.delete_channel(&cid);
        }
        ChatEvent::MemberAdded(body) | ChatEvent::MemberUpdated(body) => {
            let cid: ChannelId = body.cid.parse()?;
            let member = match (&body.member, &body.user) {
                (Some(member), _) => member.clone(),
                (None, Some(user)) => MemberPayload::for_user(user.clone()),
                (None, None) => {
                    return Err(CoreError::Payload {
                        message: format!("member event for {cid} names no user"),
                    });
                }
            };
            state.upsert_member(&cid, &member);
            state.reevaluate_queries(&cid);
        }
        ChatEvent::MemberRemoved(body) => {
            let cid: ChannelId = body.cid.parse()?;
            let Some(user_id) = body.user_id() else {
                return Err(CoreError::Payload {
                    message: format!("member event for {cid} names no user"),
                });
            };
            state.remove_member(&MemberId::new(cid.clone(), user_id));
            state.reevaluate_queries(&cid);
        }
        ChatEvent::MessageNew(body) => {
            let cid: ChannelId = body.cid.parse()?;
            state.upsert_message(&cid, &body.message);
        }
        ChatEvent::UserUpdated(body) => {
            state.upsert_user(&body.user);
        }
        ChatEvent::HealthCheck(_)
        | ChatEvent::TypingStart(_)
        | ChatEvent::TypingStop(_)
        | ChatEvent::Unknown => {}
    }
    Ok(())
}
