// ── Local store ──
//
// Identity-keyed cache of users, channels, members, messages and query
// memberships, with a single serialized writer, lock-free snapshot reads,
// optional per-user persistence, and live views that report ordered
// change lists.

mod diff;
mod local_store;
mod state;
mod view;

pub use diff::{Change, Keyed, diff};
pub use local_store::{LocalStore, PendingWrite};
pub use state::{StoreState, StoredQuery};
pub use view::LiveView;
