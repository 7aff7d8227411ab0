// ── Store state ──
//
// The committed contents of the local store. Each write runs against a
// private copy and is published as a new immutable snapshot, so readers
// never see a half-applied mutation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use chatsync_api::models::{ChannelPayload, MemberPayload, MessagePayload, UserPayload};

use crate::convert::channel_id;
use crate::error::CoreError;
use crate::model::{
    Channel, ChannelId, ChannelListQuery, Filter, Member, MemberId, Message, QueryDigest,
    QueryMembership, User,
};

/// A stored channel-list query: its filter and the channels it lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuery {
    pub filter: Filter,
    pub channels: QueryMembership,
}

/// Every cached entity, keyed by identity. Relationships are ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    version: u64,
    users: BTreeMap<String, User>,
    channels: BTreeMap<ChannelId, Channel>,
    members: BTreeMap<ChannelId, BTreeMap<String, Member>>,
    messages: BTreeMap<ChannelId, BTreeMap<String, Message>>,
    queries: BTreeMap<QueryDigest, StoredQuery>,
}

impl StoreState {
    /// Number of writes committed since the store was created.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    pub fn channel(&self, cid: &ChannelId) -> Option<&Channel> {
        self.channels.get(cid)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn member(&self, id: &MemberId) -> Option<&Member> {
        self.members.get(&id.cid).and_then(|m| m.get(&id.user_id))
    }

    /// Members of `cid`, ordered by user id.
    pub fn members(&self, cid: &ChannelId) -> Vec<&Member> {
        self.members
            .get(cid)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    pub fn member_ids(&self, cid: &ChannelId) -> BTreeSet<String> {
        self.members
            .get(cid)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Messages of `cid`, oldest first.
    pub fn messages(&self, cid: &ChannelId) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self
            .messages
            .get(cid)
            .map(|m| m.values().collect())
            .unwrap_or_default();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        messages
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.values().find_map(|m| m.get(id))
    }

    pub fn query_membership(&self, digest: &QueryDigest) -> QueryMembership {
        self.queries
            .get(digest)
            .map(|q| q.channels.clone())
            .unwrap_or_default()
    }

    pub fn stored_query(&self, digest: &QueryDigest) -> Option<&StoredQuery> {
        self.queries.get(digest)
    }

    pub fn stored_queries(&self) -> impl Iterator<Item = &StoredQuery> {
        self.queries.values()
    }

    /// Channels listed by `query`, in the query's sort order.
    pub fn query_channels(&self, query: &ChannelListQuery) -> Vec<Channel> {
        let Some(stored) = self.queries.get(&query.digest()) else {
            return Vec::new();
        };
        let mut channels: Vec<Channel> = stored
            .channels
            .iter()
            .filter_map(|cid| self.channels.get(cid).cloned())
            .collect();
        query.sort_channels(&mut channels);
        channels
    }

    // ── Upserts ──────────────────────────────────────────────────────

    pub fn upsert_user(&mut self, payload: &UserPayload) -> String {
        match self.users.get_mut(&payload.id) {
            Some(user) => user.merge_payload(payload),
            None => {
                self.users
                    .insert(payload.id.clone(), User::from_payload(payload));
            }
        }
        payload.id.clone()
    }

    /// Upsert a channel. The creator, when embedded, is upserted as a user.
    pub fn upsert_channel(&mut self, payload: &ChannelPayload) -> Result<ChannelId, CoreError> {
        let cid = channel_id(payload)?;
        if let Some(creator) = &payload.created_by {
            self.upsert_user(creator);
        }
        self.channels
            .entry(cid.clone())
            .or_insert_with(|| Channel::new(cid.clone()))
            .merge_payload(payload);
        Ok(cid)
    }

    /// Upsert a member of `cid`. The member's user row is written first so
    /// a member never references a missing user.
    pub fn upsert_member(&mut self, cid: &ChannelId, payload: &MemberPayload) -> MemberId {
        let user_id = self.upsert_user(&payload.user);
        self.members
            .entry(cid.clone())
            .or_default()
            .entry(user_id.clone())
            .or_insert_with(|| Member::new(cid.clone(), user_id.clone()))
            .merge_payload(payload);
        MemberId::new(cid.clone(), user_id)
    }

    /// Upsert a server message into `cid`, along with its author. Messages
    /// for channels not in the store are ignored.
    pub fn upsert_message(&mut self, cid: &ChannelId, payload: &MessagePayload) -> Option<String> {
        let Some(channel) = self.channels.get_mut(cid) else {
            debug!(%cid, message_id = %payload.id, "message for uncached channel ignored");
            return None;
        };
        channel.bump_last_message_at(payload.created_at);
        self.upsert_user(&payload.user);
        self.messages
            .entry(cid.clone())
            .or_default()
            .entry(payload.id.clone())
            .and_modify(|m| m.merge_payload(payload))
            .or_insert_with(|| Message::from_payload(cid.clone(), payload));
        Some(payload.id.clone())
    }

    /// Insert or replace a locally composed message.
    pub fn put_local_message(&mut self, message: Message) {
        self.messages
            .entry(message.cid.clone())
            .or_default()
            .insert(message.id.clone(), message);
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.values_mut().find_map(|m| m.get_mut(id))
    }

    // ── Removals ─────────────────────────────────────────────────────

    pub fn remove_message(&mut self, id: &str) -> bool {
        self.messages
            .values_mut()
            .any(|messages| messages.remove(id).is_some())
    }

    pub fn remove_member(&mut self, id: &MemberId) -> bool {
        let Some(members) = self.members.get_mut(&id.cid) else {
            return false;
        };
        let removed = members.remove(&id.user_id).is_some();
        if members.is_empty() {
            self.members.remove(&id.cid);
        }
        removed
    }

    /// Delete a channel with its member rows and messages, and drop it from
    /// every query. Users are kept.
    pub fn delete_channel(&mut self, cid: &ChannelId) -> bool {
        let existed = self.channels.remove(cid).is_some();
        self.members.remove(cid);
        self.messages.remove(cid);
        for query in self.queries.values_mut() {
            query.channels.remove(cid);
        }
        existed
    }

    // ── Query membership ─────────────────────────────────────────────

    /// Replace the membership of a query, remembering its filter.
    pub fn set_query_membership(
        &mut self,
        digest: QueryDigest,
        filter: &Filter,
        ids: QueryMembership,
    ) {
        self.queries.insert(
            digest,
            StoredQuery {
                filter: filter.clone(),
                channels: ids,
            },
        );
    }

    /// Add `cid` to a known query. Unknown digests are ignored.
    pub fn add_to_query(&mut self, digest: &QueryDigest, cid: &ChannelId) -> bool {
        self.queries
            .get_mut(digest)
            .is_some_and(|q| q.channels.insert(cid.clone()))
    }

    pub fn remove_from_query(&mut self, digest: &QueryDigest, cid: &ChannelId) -> bool {
        self.queries
            .get_mut(digest)
            .is_some_and(|q| q.channels.remove(cid))
    }

    /// Record one fetched page of `query`. Pages are unioned into the
    /// stored membership; channels leave a query only through events or
    /// filter re-evaluation.
    pub fn apply_query_page(&mut self, query: &ChannelListQuery, page: QueryMembership) {
        let digest = query.digest();
        match self.queries.get_mut(&digest) {
            Some(stored) => stored.channels.extend(page),
            None => self.set_query_membership(digest, &query.filter, page),
        }
    }

    /// Re-run every stored filter against `cid`. Definite answers add or
    /// remove the channel; undecidable filters leave the set alone.
    pub fn reevaluate_queries(&mut self, cid: &ChannelId) {
        let Some(channel) = self.channels.get(cid) else {
            for query in self.queries.values_mut() {
                query.channels.remove(cid);
            }
            return;
        };
        let members = self.member_ids(cid);
        for (digest, query) in &mut self.queries {
            match query.filter.matches(channel, &members) {
                Some(true) => {
                    if query.channels.insert(cid.clone()) {
                        debug!(%cid, %digest, "channel now matches query");
                    }
                }
                Some(false) => {
                    if query.channels.remove(cid) {
                        debug!(%cid, %digest, "channel no longer matches query");
                    }
                }
                None => {}
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn channel_payload(value: serde_json::Value) -> ChannelPayload {
        serde_json::from_value(value).unwrap()
    }

    fn member_payload(user_id: &str) -> MemberPayload {
        MemberPayload::for_user(UserPayload::with_id(user_id))
    }

    fn cid(s: &str) -> ChannelId {
        s.parse().unwrap()
    }

    #[test]
    fn channel_upsert_then_load_round_trips_present_fields() {
        let mut state = StoreState::default();
        let payload = channel_payload(json!({
            "cid": "messaging:c1",
            "member_count": 3,
            "frozen": false,
            "created_at": "2020-05-01T10:00:00Z",
            "name": "General"
        }));
        let id = state.upsert_channel(&payload).unwrap();
        let channel = state.channel(&id).unwrap();

        assert_eq!(channel.member_count, Some(3));
        assert_eq!(channel.is_frozen, Some(false));
        assert_eq!(channel.created_at, payload.created_at);
        assert_eq!(channel.name().as_deref(), Some("General"));
    }

    #[test]
    fn member_upsert_writes_user_first() {
        let mut state = StoreState::default();
        let id = state.upsert_member(&cid("messaging:c1"), &member_payload("u1"));
        assert!(state.user("u1").is_some());
        assert!(state.member(&id).is_some());
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut state = StoreState::default();
        let payload = channel_payload(json!({ "cid": "messaging:c1", "name": "General" }));
        state.upsert_channel(&payload).unwrap();
        let once = state.clone();
        state.upsert_channel(&payload).unwrap();
        assert_eq!(state, once);
    }

    #[test]
    fn delete_channel_orphans_members_but_keeps_users() {
        let mut state = StoreState::default();
        let c1 = state
            .upsert_channel(&channel_payload(json!({ "cid": "messaging:c1" })))
            .unwrap();
        state.upsert_member(&c1, &member_payload("u1"));
        let query = ChannelListQuery::default();
        state.apply_query_page(&query, [c1.clone()].into());

        assert!(state.delete_channel(&c1));
        assert!(state.channel(&c1).is_none());
        assert!(state.members(&c1).is_empty());
        assert!(state.query_membership(&query.digest()).is_empty());
        assert!(state.user("u1").is_some());
    }

    #[test]
    fn pages_union_into_membership() {
        let mut state = StoreState::default();
        let query = ChannelListQuery::default();
        state.apply_query_page(&query, [cid("m:a"), cid("m:b")].into());
        let next = query.clone().with_pagination(query.pagination.next());
        state.apply_query_page(&next, [cid("m:c")].into());
        assert_eq!(state.query_membership(&query.digest()).len(), 3);

        // Re-reading the first page keeps channels materialized from later pages.
        state.apply_query_page(&query, [cid("m:a"), cid("m:b")].into());
        assert_eq!(
            state.query_membership(&query.digest()),
            QueryMembership::from([cid("m:a"), cid("m:b"), cid("m:c")])
        );
    }

    #[test]
    fn reevaluation_applies_definite_answers_only() {
        let mut state = StoreState::default();
        let c1 = state
            .upsert_channel(&channel_payload(json!({ "cid": "messaging:c1" })))
            .unwrap();
        state.upsert_member(&c1, &member_payload("u1"));

        let mine = ChannelListQuery::new(Filter::is_in("members", ["u1"]));
        let undecidable =
            ChannelListQuery::new(Filter::from_value(json!({ "last_message_at": { "$gt": 0 } })));
        state.apply_query_page(&mine, [c1.clone()].into());
        state.apply_query_page(&undecidable, [c1.clone()].into());

        state.remove_member(&MemberId::new(c1.clone(), "u1"));
        state.reevaluate_queries(&c1);

        assert!(state.query_membership(&mine.digest()).is_empty());
        assert!(state.query_membership(&undecidable.digest()).contains(&c1));
    }

    #[test]
    fn messages_for_unknown_channels_are_ignored() {
        let mut state = StoreState::default();
        let payload: MessagePayload = serde_json::from_value(json!({
            "id": "m1", "text": "hi", "user": { "id": "u1" }
        }))
        .unwrap();
        assert!(state.upsert_message(&cid("messaging:nope"), &payload).is_none());
        assert!(state.message("m1").is_none());
    }
}
