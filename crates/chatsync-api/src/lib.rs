// chatsync-api: wire layer for the chatsync client (requests, payloads, realtime events)

pub mod endpoint;
pub mod error;
pub mod events;
pub mod models;
pub mod transport;
pub mod websocket;

pub use endpoint::{Endpoint, Method};
pub use error::Error;
pub use events::ChatEvent;
pub use transport::{
    ConnectionIdProvider, ConnectionIdWaiter, HttpClient, RequestClient, TlsMode,
    TransportConfig, request, request_cancellable, request_with_timeout,
};
pub use websocket::{ConnectionState, RealtimeClient, RealtimeConfig, ReconnectConfig};
