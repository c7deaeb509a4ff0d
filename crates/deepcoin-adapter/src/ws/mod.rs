/*
[INPUT]:  Endpoint selection, subscription intents and consumer callbacks
[OUTPUT]: Managed WebSocket sessions with per-topic event routing
[POS]:    WebSocket layer - real-time data streams
[UPDATE]: When adding new channels or changing connection logic
*/

pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod manager;
pub mod topics;
pub mod transport;

pub use connection::{Connection, ConnectionConfig, ConnectionHandler, ConnectionState};
pub use dispatcher::{Callback, Dispatcher};
pub use endpoint::{
    Endpoint,
    PRIVATE_WS_ENDPOINT,
    PUBLIC_FUTURES_WS_ENDPOINT,
    PUBLIC_SPOT_WS_ENDPOINT,
};
pub use manager::DeepcoinWebsocketManager;
pub use topics::{PushMessage, SubscriptionRequest, WireAction, WireMessage};
pub use transport::{
    Frame,
    FrameReader,
    FrameWriter,
    LoopbackPeer,
    LoopbackSession,
    LoopbackTransport,
    Session,
    Transport,
    TungsteniteTransport,
    loopback,
};
