/*
[INPUT]:  Endpoint choice and, for the private stream, a listen key
[OUTPUT]: WebSocket URL to connect to
[POS]:    WebSocket layer - logical endpoint selection
[UPDATE]: When Deepcoin moves stream hosts or adds endpoints
*/

use std::fmt;

use url::Url;

use crate::error::{DeepcoinError, Result};

pub const PUBLIC_FUTURES_WS_ENDPOINT: &str =
    "wss://stream.deepcoin.com/streamlet/trade/public/swap?platform=api";
pub const PUBLIC_SPOT_WS_ENDPOINT: &str =
    "wss://stream.deepcoin.com/streamlet/trade/public/spot?platform=api";
pub const PRIVATE_WS_ENDPOINT: &str = "wss://stream.deepcoin.com/v1/private";

#[derive(Clone, PartialEq, Eq)]
pub enum Endpoint {
    PublicFutures,
    PublicSpot,
    Private { listen_key: String },
    /// Any other URL, e.g. a proxy or a local test server
    Custom(String),
}

impl Endpoint {
    pub fn url(&self) -> Result<String> {
        match self {
            Endpoint::PublicFutures => Ok(PUBLIC_FUTURES_WS_ENDPOINT.to_string()),
            Endpoint::PublicSpot => Ok(PUBLIC_SPOT_WS_ENDPOINT.to_string()),
            Endpoint::Private { listen_key } => {
                if listen_key.trim().is_empty() {
                    return Err(DeepcoinError::InvalidArgument(
                        "private endpoint requires a listen key".to_string(),
                    ));
                }
                let url = Url::parse_with_params(PRIVATE_WS_ENDPOINT, &[("listenKey", listen_key)])?;
                Ok(url.to_string())
            }
            Endpoint::Custom(raw) => Ok(Url::parse(raw)?.to_string()),
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Endpoint::Private { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::PublicFutures => "public-futures",
            Endpoint::PublicSpot => "public-spot",
            Endpoint::Private { .. } => "private",
            Endpoint::Custom(_) => "custom",
        }
    }
}

// Keeps the listen key out of logs.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Private { .. } => f
                .debug_struct("Private")
                .field("listen_key", &"<redacted>")
                .finish(),
            Endpoint::Custom(url) => f.debug_tuple("Custom").field(url).finish(),
            other => f.write_str(other.label()),
        }
    }
}
