// ── Payload-to-entity merges ──
//
// Bridges `chatsync_api` wire payloads into the cached domain entities.
// Every merge is field-level: fields absent from the payload keep their
// stored value, and a payload whose `updated_at` is older than the stored
// one may only fill fields that are still empty.

use chatsync_api::models::{
    ChannelPayload, ExtraFields, MemberPayload, MessagePayload, UserPayload,
};

use crate::error::CoreError;
use crate::model::{
    Channel, ChannelId, Freshness, Member, MemberRole, Message, User, UserRole, merge_field,
};

/// Keys of a channel payload that describe relationships or server-side
/// configuration rather than the channel itself.
const CHANNEL_RESERVED_KEYS: &[&str] = &["members", "messages", "read", "watchers", "config"];

// ── User ───────────────────────────────────────────────────────────

impl User {
    pub(crate) fn from_payload(payload: &UserPayload) -> Self {
        let mut user = Self::new(payload.id.clone());
        user.merge_payload(payload);
        user
    }

    pub(crate) fn merge_payload(&mut self, payload: &UserPayload) {
        let freshness = Freshness::of(self.updated_at, payload.updated_at);
        merge_field(&mut self.role, payload.role.clone().map(UserRole::from), freshness);
        merge_field(&mut self.is_online, payload.online, freshness);
        merge_field(&mut self.is_banned, payload.banned, freshness);
        merge_field(&mut self.is_invisible, payload.invisible, freshness);
        merge_field(&mut self.created_at, payload.created_at, freshness);
        merge_field(&mut self.updated_at, payload.updated_at, freshness);
        merge_field(&mut self.last_active_at, payload.last_active, freshness);
        self.extra_data.merge(&payload.extra, freshness.overwrites());
    }
}

// ── Channel ────────────────────────────────────────────────────────

/// Identity of a channel payload: the `cid` field, or `type` + `id` when
/// the cid is missing or malformed.
pub(crate) fn channel_id(payload: &ChannelPayload) -> Result<ChannelId, CoreError> {
    match payload.cid.parse::<ChannelId>() {
        Ok(cid) => Ok(cid),
        Err(err) => match (payload.kind.as_deref(), payload.id.as_deref()) {
            (Some(kind), Some(id)) if !kind.is_empty() && !id.is_empty() => {
                Ok(ChannelId::new(kind, id))
            }
            _ => Err(err),
        },
    }
}

impl Channel {
    pub(crate) fn merge_payload(&mut self, payload: &ChannelPayload) {
        let freshness = Freshness::of(self.updated_at, payload.updated_at);
        merge_field(&mut self.member_count, payload.member_count, freshness);
        merge_field(&mut self.is_frozen, payload.frozen, freshness);
        merge_field(
            &mut self.created_by,
            payload.created_by.as_ref().map(|u| u.id.clone()),
            freshness,
        );
        merge_field(&mut self.created_at, payload.created_at, freshness);
        merge_field(&mut self.updated_at, payload.updated_at, freshness);
        self.bump_last_message_at(payload.last_message_at);
        self.extra_data
            .merge(&channel_extra(&payload.extra), freshness.overwrites());
    }

    /// `last_message_at` only ever moves forward.
    pub(crate) fn bump_last_message_at(&mut self, at: Option<chrono::DateTime<chrono::Utc>>) {
        if let Some(at) = at {
            if self.last_message_at.is_none_or(|current| at > current) {
                self.last_message_at = Some(at);
            }
        }
    }
}

fn channel_extra(extra: &ExtraFields) -> ExtraFields {
    extra
        .iter()
        .filter(|(key, _)| !CHANNEL_RESERVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

// ── Member ─────────────────────────────────────────────────────────

impl Member {
    pub(crate) fn merge_payload(&mut self, payload: &MemberPayload) {
        let freshness = Freshness::of(self.updated_at, payload.updated_at);
        merge_field(&mut self.role, payload.role.clone().map(MemberRole::from), freshness);
        merge_field(&mut self.is_invited, payload.invited, freshness);
        merge_field(&mut self.invite_accepted_at, payload.invite_accepted_at, freshness);
        merge_field(&mut self.invite_rejected_at, payload.invite_rejected_at, freshness);
        merge_field(&mut self.created_at, payload.created_at, freshness);
        merge_field(&mut self.updated_at, payload.updated_at, freshness);
    }
}

// ── Message ────────────────────────────────────────────────────────

impl Message {
    pub(crate) fn from_payload(cid: ChannelId, payload: &MessagePayload) -> Self {
        let mut message = Self {
            id: payload.id.clone(),
            cid,
            author_id: payload.user.id.clone(),
            text: String::new(),
            kind: None,
            created_at: None,
            updated_at: None,
            local_state: None,
            extra_data: crate::model::ExtraData::default(),
        };
        message.merge_payload(payload);
        message
    }

    /// Apply a server copy. A server copy always acknowledges the message.
    pub(crate) fn merge_payload(&mut self, payload: &MessagePayload) {
        let freshness = Freshness::of(self.updated_at, payload.updated_at);
        if let Some(text) = &payload.text {
            if freshness.overwrites() || self.text.is_empty() {
                self.text.clone_from(text);
            }
        }
        merge_field(&mut self.kind, payload.kind.clone(), freshness);
        merge_field(&mut self.created_at, payload.created_at, freshness);
        merge_field(&mut self.updated_at, payload.updated_at, freshness);
        self.extra_data.merge(&payload.extra, freshness.overwrites());
        self.local_state = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn user(value: serde_json::Value) -> UserPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn user_merge_keeps_fields_absent_from_payload() {
        let mut stored = User::from_payload(&user(json!({
            "id": "u1", "role": "admin", "online": true, "name": "Luke"
        })));
        stored.merge_payload(&user(json!({ "id": "u1", "online": false })));

        assert_eq!(stored.role, Some(UserRole::Admin));
        assert_eq!(stored.is_online, Some(false));
        assert_eq!(stored.name().as_deref(), Some("Luke"));
    }

    #[test]
    fn older_user_payload_only_fills_gaps() {
        let mut stored = User::from_payload(&user(json!({
            "id": "u1", "online": true, "updated_at": "2021-01-01T00:00:00Z"
        })));
        stored.merge_payload(&user(json!({
            "id": "u1",
            "online": false,
            "role": "guest",
            "updated_at": "2020-01-01T00:00:00Z"
        })));

        assert_eq!(stored.is_online, Some(true));
        assert_eq!(stored.role, Some(UserRole::Guest));
        assert_eq!(
            stored.updated_at,
            Some(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn channel_id_falls_back_to_type_and_id() {
        let mut payload = ChannelPayload::with_cid("");
        payload.kind = Some("messaging".into());
        payload.id = Some("c1".into());
        assert_eq!(channel_id(&payload).unwrap(), ChannelId::new("messaging", "c1"));

        assert!(channel_id(&ChannelPayload::with_cid("bogus")).is_err());
    }

    #[test]
    fn channel_extra_skips_relationship_keys() {
        let payload: ChannelPayload = serde_json::from_value(json!({
            "cid": "messaging:c1",
            "name": "General",
            "members": [{ "user": { "id": "u1" } }]
        }))
        .unwrap();
        let mut channel = Channel::new(channel_id(&payload).unwrap());
        channel.merge_payload(&payload);

        assert_eq!(channel.name().as_deref(), Some("General"));
        assert!(channel.extra_data.get("members").is_none());
    }

    #[test]
    fn last_message_at_never_moves_back() {
        let mut channel = Channel::new(ChannelId::new("messaging", "c1"));
        let late = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        channel.bump_last_message_at(Some(late));
        channel.bump_last_message_at(Some(early));
        channel.bump_last_message_at(None);
        assert_eq!(channel.last_message_at, Some(late));
    }

    #[test]
    fn server_copy_acknowledges_message() {
        let payload: MessagePayload = serde_json::from_value(json!({
            "id": "m1", "text": "hello", "user": { "id": "u1" },
            "created_at": "2021-01-01T00:00:00Z"
        }))
        .unwrap();
        let mut message = Message::from_payload(ChannelId::new("messaging", "c1"), &payload);
        message.local_state = Some(crate::model::LocalMessageState::Sending);
        message.merge_payload(&payload);

        assert!(message.is_acknowledged());
        assert_eq!(message.text, "hello");
        assert_eq!(message.author_id, "u1");
    }

    #[test]
    fn message_merge_keeps_text_absent_from_payload() {
        let cid = ChannelId::new("messaging", "c1");
        let full: MessagePayload = serde_json::from_value(json!({
            "id": "m1", "text": "hello", "user": { "id": "u1" }
        }))
        .unwrap();
        let partial: MessagePayload = serde_json::from_value(json!({
            "id": "m1", "user": { "id": "u1" }, "type": "regular"
        }))
        .unwrap();
        assert_eq!(partial.text, None);

        let mut message = Message::from_payload(cid, &full);
        message.merge_payload(&partial);

        assert_eq!(message.text, "hello");
        assert_eq!(message.kind.as_deref(), Some("regular"));
    }
}
