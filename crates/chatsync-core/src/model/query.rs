// ── Channel list query ──
//
// Filter + sort + pagination. The digest (sha256 of the canonical filter)
// keys the query's membership set in the local store, so every page of
// the same filter shares one set.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Channel, ChannelId, Filter};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Stable cache key of a query: hex sha256 of its canonical filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryDigest(String);

impl QueryDigest {
    pub fn of(filter: &Filter) -> Self {
        Self(format!("{:x}", Sha256::digest(filter.canonical().as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueryDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Sort ────────────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortField {
    LastMessageAt,
    CreatedAt,
    UpdatedAt,
    MemberCount,
    Cid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Sort {
    pub fn ascending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }

    /// Wire form: `{"field": "last_message_at", "direction": -1}`.
    pub fn to_wire(self) -> serde_json::Value {
        let direction = match self.direction {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        };
        serde_json::json!({ "field": self.field.to_string(), "direction": direction })
    }
}

/// Compare two channels under `sort`. Missing values sort last; ties fall
/// back to `cid` ascending.
pub fn compare_channels(sort: &[Sort], a: &Channel, b: &Channel) -> Ordering {
    for key in sort {
        let ord = compare_field(key, a, b);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.cid.cmp(&b.cid)
}

fn compare_field(key: &Sort, a: &Channel, b: &Channel) -> Ordering {
    fn present_first<T: Ord>(a: Option<T>, b: Option<T>, dir: SortDirection) -> Ordering {
        match (a, b) {
            (Some(x), Some(y)) => match dir {
                SortDirection::Ascending => x.cmp(&y),
                SortDirection::Descending => y.cmp(&x),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    let dir = key.direction;
    match key.field {
        SortField::LastMessageAt => present_first(a.last_message_at, b.last_message_at, dir),
        SortField::CreatedAt => present_first(a.created_at, b.created_at, dir),
        SortField::UpdatedAt => present_first(a.updated_at, b.updated_at, dir),
        SortField::MemberCount => present_first(a.member_count, b.member_count, dir),
        SortField::Cid => present_first(Some(&a.cid), Some(&b.cid), dir),
    }
}

// ── Pagination ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn next(&self) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset.saturating_add(self.limit),
        }
    }
}

// ── ChannelListQuery ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelListQuery {
    pub filter: Filter,
    pub sort: Vec<Sort>,
    pub pagination: Pagination,
    /// Ask the server to push events for the returned channels to this
    /// connection.
    pub watch: bool,
}

impl ChannelListQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort: Vec::new(),
            pagination: Pagination::default(),
            watch: true,
        }
    }

    pub fn sorted_by(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn digest(&self) -> QueryDigest {
        QueryDigest::of(&self.filter)
    }

    /// Request body for the channel query endpoint.
    pub fn to_wire(&self) -> serde_json::Value {
        serde_json::json!({
            "filter_conditions": self.filter.as_value(),
            "sort": self.sort.iter().map(|s| s.to_wire()).collect::<Vec<_>>(),
            "limit": self.pagination.limit,
            "offset": self.pagination.offset,
            "watch": self.watch,
            "state": true,
            "presence": false,
        })
    }

    /// Order `channels` the way this query sorts them.
    pub fn sort_channels(&self, channels: &mut [Channel]) {
        channels.sort_by(|a, b| compare_channels(&self.sort, a, b));
    }

    /// Three-valued local match; see [`Filter::matches`].
    pub fn matches(&self, channel: &Channel, members: &BTreeSet<String>) -> Option<bool> {
        self.filter.matches(channel, members)
    }
}

impl Default for ChannelListQuery {
    fn default() -> Self {
        Self::new(Filter::all())
    }
}

/// Channel ids a query currently lists.
pub type QueryMembership = BTreeSet<ChannelId>;
