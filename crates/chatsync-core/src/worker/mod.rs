// ── Workers ──
//
// Stateless bridges between the network and the local store. Fetch
// workers run on demand; the event worker runs on push. Both feed the same
// apply functions.

mod apply;
mod channel;
mod channel_list;
mod events;
mod sender;
#[cfg(test)]
pub(crate) mod testing;

pub use channel::ChannelUpdater;
pub use channel_list::ChannelListUpdater;
pub use events::EventHandler;
pub use sender::MessageSender;
