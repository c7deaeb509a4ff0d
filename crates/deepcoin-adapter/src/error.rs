/*
[INPUT]:  Error sources (codec, WebSocket transport, HTTP, API envelope, serialization)
[OUTPUT]: Structured error type with kind classification and retry hints
[POS]:    Error handling layer - unified error type for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use reqwest::StatusCode;
use thiserror::Error;

/// Main error type for the Deepcoin adapter
#[derive(Error, Debug)]
pub enum DeepcoinError {
    /// Bad symbol, period or topic, rejected before any network I/O
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Send attempted while the connection is not open
    #[error("WebSocket not connected")]
    NotConnected,

    /// Inbound frame could not be decoded into a topic and payload
    #[error("Failed to decode frame: {0}")]
    Decode(String),

    /// Writing a frame to the transport failed
    #[error("WebSocket send failed: {0}")]
    Send(String),

    /// Handshake or connection failure
    #[error("WebSocket transport error: {0}")]
    Transport(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error (code {code}): {message}")]
    Api { code: String, message: String },

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of [`DeepcoinError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotConnected,
    Decode,
    Send,
    Transport,
    Http,
    Api,
    Serialization,
    Config,
}

impl DeepcoinError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeepcoinError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DeepcoinError::NotConnected => ErrorKind::NotConnected,
            DeepcoinError::Decode(_) => ErrorKind::Decode,
            DeepcoinError::Send(_) => ErrorKind::Send,
            DeepcoinError::Transport(_) => ErrorKind::Transport,
            DeepcoinError::Http(_) => ErrorKind::Http,
            DeepcoinError::Api { .. } | DeepcoinError::InvalidResponse(_) => ErrorKind::Api,
            DeepcoinError::Serialization(_) => ErrorKind::Serialization,
            DeepcoinError::UrlParse(_) | DeepcoinError::Config(_) => ErrorKind::Config,
        }
    }

    /// Check if the error concerns the WebSocket session itself
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DeepcoinError::NotConnected | DeepcoinError::Send(_) | DeepcoinError::Transport(_)
        )
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeepcoinError::Http(_)
                | DeepcoinError::InvalidResponse(_)
                | DeepcoinError::NotConnected
                | DeepcoinError::Send(_)
                | DeepcoinError::Transport(_)
        )
    }

    /// Create an API error from status code and message
    pub fn api_error(status: StatusCode, message: impl Into<String>) -> Self {
        DeepcoinError::Api {
            code: status.as_u16().to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for Deepcoin operations
pub type Result<T> = std::result::Result<T, DeepcoinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(
            DeepcoinError::InvalidArgument("period".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(DeepcoinError::NotConnected.kind(), ErrorKind::NotConnected);
        assert_eq!(DeepcoinError::Decode("x".into()).kind(), ErrorKind::Decode);
        assert_eq!(DeepcoinError::Config("x".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DeepcoinError::Transport("reset".into()).is_retryable());
        assert!(DeepcoinError::NotConnected.is_connection_error());

        let invalid = DeepcoinError::InvalidArgument("symbol".into());
        assert!(!invalid.is_retryable());
        assert!(!invalid.is_connection_error());
    }

    #[test]
    fn test_api_error_creation() {
        let err = DeepcoinError::api_error(StatusCode::BAD_REQUEST, "Invalid listen key");
        match err {
            DeepcoinError::Api { code, message } => {
                assert_eq!(code, "400");
                assert_eq!(message, "Invalid listen key");
            }
            _ => panic!("Expected Api error variant"),
        }
    }
}
