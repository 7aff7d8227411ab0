// ── Channel query filters ──
//
// Filters use the service's JSON operator syntax and are sent to the
// server verbatim. Locally they are evaluated three-valued: a small
// operator subset gives a definite answer, everything else is `None`
// ("cannot tell") and leaves cached query results alone.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::Channel;

/// A channel-list filter, e.g. `{"type": "messaging", "members": {"$in": ["u1"]}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Value);

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

impl Filter {
    /// Matches every channel.
    pub fn all() -> Self {
        Self(Value::Object(Map::new()))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self(json!({ field: { "$eq": value.into() } }))
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self(json!({ field: { "$ne": value.into() } }))
    }

    pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self(json!({ field: { "$in": values } }))
    }

    pub fn not_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Self(json!({ field: { "$nin": values } }))
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let parts: Vec<Value> = filters.into_iter().map(|f| f.0).collect();
        Self(json!({ "$and": parts }))
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let parts: Vec<Value> = filters.into_iter().map(|f| f.0).collect();
        Self(json!({ "$or": parts }))
    }

    /// Canonical text form. `serde_json` maps keep keys sorted, so equal
    /// filters always produce equal text.
    pub fn canonical(&self) -> String {
        self.0.to_string()
    }

    /// Evaluate against a cached channel and its member user ids.
    ///
    /// `Some(true)`/`Some(false)` are definite; `None` means the filter uses
    /// something that cannot be decided locally.
    pub fn matches(&self, channel: &Channel, members: &BTreeSet<String>) -> Option<bool> {
        let target = Target { channel, members };
        eval_node(&self.0, &target)
    }
}

struct Target<'a> {
    channel: &'a Channel,
    members: &'a BTreeSet<String>,
}

/// What a filter field resolves to on a channel.
enum FieldValue {
    Scalar(Value),
    Set(Vec<Value>),
    Unknown,
}

impl Target<'_> {
    fn field(&self, name: &str) -> FieldValue {
        let cid = &self.channel.cid;
        match name {
            "cid" => FieldValue::Scalar(Value::String(cid.to_string())),
            "type" => FieldValue::Scalar(Value::String(cid.kind().to_owned())),
            "id" => FieldValue::Scalar(Value::String(cid.id().to_owned())),
            "members" => FieldValue::Set(
                self.members.iter().map(|m| Value::String(m.clone())).collect(),
            ),
            "frozen" => self
                .channel
                .is_frozen
                .map_or(FieldValue::Unknown, |b| FieldValue::Scalar(Value::Bool(b))),
            "member_count" => self
                .channel
                .member_count
                .map_or(FieldValue::Unknown, |n| FieldValue::Scalar(Value::from(n))),
            other => self
                .channel
                .extra_data
                .get(other)
                .map_or(FieldValue::Unknown, FieldValue::Scalar),
        }
    }
}

fn eval_node(node: &Value, target: &Target<'_>) -> Option<bool> {
    let Value::Object(map) = node else {
        return None;
    };
    all(map.iter().map(|(key, value)| match key.as_str() {
        "$and" => value.as_array().and_then(|parts| all(parts.iter().map(|p| eval_node(p, target)))),
        "$or" => value.as_array().and_then(|parts| any(parts.iter().map(|p| eval_node(p, target)))),
        op if op.starts_with('$') => None,
        field => eval_field(&target.field(field), value),
    }))
}

fn eval_field(field: &FieldValue, condition: &Value) -> Option<bool> {
    match condition {
        Value::Object(ops) if ops.keys().all(|k| k.starts_with('$')) => {
            all(ops.iter().map(|(op, operand)| eval_op(field, op, operand)))
        }
        literal => eval_op(field, "$eq", literal),
    }
}

fn eval_op(field: &FieldValue, op: &str, operand: &Value) -> Option<bool> {
    let contains = |v: &Value| -> Option<bool> {
        match field {
            FieldValue::Scalar(s) => Some(s == v),
            FieldValue::Set(items) => Some(items.contains(v)),
            FieldValue::Unknown => None,
        }
    };
    match op {
        "$eq" => contains(operand),
        "$ne" => contains(operand).map(|b| !b),
        "$in" => operand.as_array().and_then(|vs| any(vs.iter().map(contains))),
        "$nin" => operand
            .as_array()
            .and_then(|vs| any(vs.iter().map(contains)))
            .map(|b| !b),
        _ => None,
    }
}

/// Three-valued AND: any definite `false` wins, then any unknown.
fn all(results: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for r in results {
        match r {
            Some(false) => return Some(false),
            None => unknown = true,
            Some(true) => {}
        }
    }
    if unknown { None } else { Some(true) }
}

/// Three-valued OR: any definite `true` wins, then any unknown.
fn any(results: impl Iterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for r in results {
        match r {
            Some(true) => return Some(true),
            None => unknown = true,
            Some(false) => {}
        }
    }
    if unknown { None } else { Some(false) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{ChannelId, ExtraData};

    fn channel(cid: &str, extra: Value) -> Channel {
        let mut ch = Channel::new(cid.parse::<ChannelId>().unwrap());
        ch.extra_data = ExtraData::from_fields(&serde_json::from_value(extra).unwrap());
        ch
    }

    fn members(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let ch = channel("messaging:c1", json!({}));
        assert_eq!(Filter::all().matches(&ch, &members(&[])), Some(true));
    }

    #[test]
    fn members_in() {
        let ch = channel("messaging:c1", json!({}));
        let f = Filter::is_in("members", ["u1"]);
        assert_eq!(f.matches(&ch, &members(&["u1", "u2"])), Some(true));
        assert_eq!(f.matches(&ch, &members(&["u2"])), Some(false));
    }

    #[test]
    fn type_and_cid() {
        let ch = channel("messaging:c1", json!({}));
        assert_eq!(Filter::eq("type", "messaging").matches(&ch, &members(&[])), Some(true));
        assert_eq!(Filter::ne("cid", "messaging:c1").matches(&ch, &members(&[])), Some(false));
        assert_eq!(
            Filter::not_in("id", ["c2", "c3"]).matches(&ch, &members(&[])),
            Some(true)
        );
    }

    #[test]
    fn implicit_eq_and_extra_fields() {
        let ch = channel("messaging:c1", json!({ "color": "blue" }));
        let f = Filter::from_value(json!({ "color": "blue", "type": "messaging" }));
        assert_eq!(f.matches(&ch, &members(&[])), Some(true));
        let f = Filter::from_value(json!({ "color": "red" }));
        assert_eq!(f.matches(&ch, &members(&[])), Some(false));
    }

    #[test]
    fn unsupported_operators_are_undecidable() {
        let ch = channel("messaging:c1", json!({}));
        let f = Filter::from_value(json!({ "last_message_at": { "$gt": "2020-01-01T00:00:00Z" } }));
        assert_eq!(f.matches(&ch, &members(&[])), None);
        let f = Filter::from_value(json!({ "joined": true }));
        assert_eq!(f.matches(&ch, &members(&[])), None);
    }

    #[test]
    fn definite_false_beats_unknown_in_and() {
        let ch = channel("messaging:c1", json!({}));
        let f = Filter::and([
            Filter::from_value(json!({ "joined": true })),
            Filter::eq("type", "team"),
        ]);
        assert_eq!(f.matches(&ch, &members(&[])), Some(false));
    }

    #[test]
    fn definite_true_beats_unknown_in_or() {
        let ch = channel("messaging:c1", json!({}));
        let f = Filter::or([
            Filter::from_value(json!({ "joined": true })),
            Filter::eq("type", "messaging"),
        ]);
        assert_eq!(f.matches(&ch, &members(&[])), Some(true));
    }

    #[test]
    fn canonical_form_ignores_key_order() {
        let a = Filter::from_value(serde_json::from_str(r#"{"type":"messaging","id":"c1"}"#).unwrap());
        let b = Filter::from_value(serde_json::from_str(r#"{"id":"c1","type":"messaging"}"#).unwrap());
        assert_eq!(a.canonical(), b.canonical());
    }
}
