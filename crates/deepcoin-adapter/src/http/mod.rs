/*
[INPUT]:  HTTP client configuration and API credentials
[OUTPUT]: Signed REST calls needed before opening the private stream
[POS]:    HTTP layer - REST API communication
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod client;
pub mod listen_key;
pub mod signature;

pub use crate::error::{DeepcoinError, Result};
pub use signature::RequestSigner;

pub use client::{ClientConfig, Credentials, DeepcoinClient};
pub use listen_key::{ListenKeyProvider, StaticListenKey};
