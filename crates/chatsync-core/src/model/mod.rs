// ── Domain model ──
//
// Cached entities, their identities, and channel-list queries. Entities
// reference each other by id only; relationships are resolved through the
// store.

mod channel;
mod extra_data;
mod filter;
mod ids;
mod member;
mod message;
mod query;
mod user;

pub use channel::Channel;
pub use extra_data::ExtraData;
pub use filter::Filter;
pub use ids::{ChannelId, MemberId};
pub use member::{Member, MemberRole};
pub use message::{LocalMessageState, Message};
pub use query::{
    ChannelListQuery, DEFAULT_PAGE_SIZE, Pagination, QueryDigest, QueryMembership, Sort,
    SortDirection, SortField, compare_channels,
};
pub use user::{User, UserRole};

use chrono::{DateTime, Utc};

/// How an incoming payload relates to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freshness {
    /// Present fields overwrite.
    Current,
    /// Provably older than what is stored; may only fill empty fields.
    Stale,
}

impl Freshness {
    pub(crate) fn of(stored: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> Self {
        match (stored, incoming) {
            (Some(stored), Some(incoming)) if incoming < stored => Self::Stale,
            _ => Self::Current,
        }
    }

    pub(crate) fn overwrites(self) -> bool {
        self == Self::Current
    }
}

/// Field-level merge: an absent incoming value never clears the slot.
pub(crate) fn merge_field<T>(slot: &mut Option<T>, incoming: Option<T>, freshness: Freshness) {
    if let Some(value) = incoming {
        if freshness.overwrites() || slot.is_none() {
            *slot = Some(value);
        }
    }
}
