// chatsync-core: offline-first sync engine between chatsync-api and the presentation layer.

pub mod client;
pub mod config;
pub mod controller;
mod convert;
pub mod error;
pub mod model;
pub mod store;
pub mod worker;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::ChatClient;
pub use config::{ClientConfig, CurrentUser, ReconnectConfig, StorageMode, TlsMode};
pub use controller::{
    ChannelController, ChannelEvent, ChannelListController, ChannelListEvent, EntityChange,
    FetchCompletion,
};
pub use error::{CoreError, StoreError};
pub use store::{Change, LiveView, LocalStore, StoreState};
pub use worker::{ChannelListUpdater, ChannelUpdater, EventHandler, MessageSender};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Channel, ChannelId, ChannelListQuery, ExtraData, Filter, LocalMessageState, Member, MemberId,
    MemberRole, Message, Pagination, QueryDigest, QueryMembership, Sort, SortDirection, SortField,
    User, UserRole,
};
