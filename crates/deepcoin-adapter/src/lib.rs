/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public Deepcoin adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod error;
pub mod http;
pub mod types;
pub mod ws;

// Re-export commonly used types from error
pub use error::{DeepcoinError, ErrorKind, Result};

// Re-export commonly used types from http
pub use http::{
    ClientConfig,
    Credentials,
    DeepcoinClient,
    ListenKeyProvider,
    RequestSigner,
    StaticListenKey,
};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    ConnectionConfig,
    ConnectionState,
    DeepcoinWebsocketManager,
    Endpoint,
    PushMessage,
    WireMessage,
};
