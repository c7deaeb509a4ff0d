/*
[INPUT]:  Timestamp, HTTP method, request path and body
[OUTPUT]: Signed request headers (DC-ACCESS-SIGN)
[POS]:    HTTP layer - request signing for authenticated endpoints
[UPDATE]: When changing signing algorithm or header format
*/

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{DeepcoinError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signs HTTP requests for authenticated endpoints
#[derive(Clone)]
pub struct RequestSigner {
    secret: String,
}

impl RequestSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// ISO-8601 UTC timestamp with milliseconds, e.g. `2024-01-02T03:04:05.678Z`
    pub fn timestamp() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Sign a request
    ///
    /// Format: "{timestamp}{METHOD}{request_path}{body}"
    /// Returns base64-encoded HMAC-SHA256
    pub fn sign(&self, timestamp: &str, method: &str, request_path: &str, body: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|err| DeepcoinError::Config(format!("invalid api secret: {err}")))?;
        mac.update(timestamp.as_bytes());
        mac.update(method.to_ascii_uppercase().as_bytes());
        mac.update(request_path.as_bytes());
        mac.update(body.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMESTAMP: &str = "2024-01-02T03:04:05.678Z";

    #[test]
    fn test_sign_get_request() {
        let signer = RequestSigner::new("test-secret");
        let signature = signer
            .sign(TIMESTAMP, "GET", "/deepcoin/listenkey/acquire", "")
            .unwrap();
        assert_eq!(signature, "aw9J/wz0iDWwVhuaOJSTE94pEQuULy3yXHqo+dqJIzE=");
    }

    #[test]
    fn test_sign_includes_body_and_uppercases_method() {
        let signer = RequestSigner::new("test-secret");
        let signature = signer
            .sign(
                TIMESTAMP,
                "post",
                "/deepcoin/trade/order",
                r#"{"instId":"BTC-USDT-SWAP"}"#,
            )
            .unwrap();
        assert_eq!(signature, "rUIGqRzaF8SgsoHy1D2euNBdVysmpAxabh53gxjn6zY=");
    }

    #[test]
    fn test_timestamp_format() {
        let timestamp = RequestSigner::timestamp();
        assert_eq!(timestamp.len(), TIMESTAMP.len());
        assert!(timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&timestamp).is_ok());
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = RequestSigner::new("test-secret");
        assert!(!format!("{signer:?}").contains("test-secret"));
    }
}
