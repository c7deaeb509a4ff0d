/*
[INPUT]:  HTTP configuration (base URL, timeouts, API credentials)
[OUTPUT]: Signed reqwest calls with Deepcoin envelope unwrapping
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::fmt;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DeepcoinError, Result};
use crate::http::signature::RequestSigner;

/// Base URL for Deepcoin REST API
const BASE_URL: &str = "https://api.deepcoin.com";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// API key credentials for signed requests
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

/// Minimal signed HTTP client for Deepcoin
#[derive(Debug)]
pub struct DeepcoinClient {
    http_client: Client,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl DeepcoinClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Self::with_config_and_base_url(config, BASE_URL)
    }

    /// Create a client against another host, e.g. a mock server
    pub fn with_config_and_base_url(config: ClientConfig, base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            credentials: None,
        })
    }

    /// Set credentials for authenticated requests
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    /// Get credentials if set
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Build a signed request; `endpoint` is the path plus query string
    pub(crate) fn signed_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<RequestBuilder> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            DeepcoinError::Config("credentials are required for signed endpoints".to_string())
        })?;

        let url = self.base_url.join(endpoint)?;
        let body = body.map(Value::to_string).unwrap_or_default();
        let timestamp = RequestSigner::timestamp();
        let signature = RequestSigner::new(credentials.api_secret.as_str()).sign(
            &timestamp,
            method.as_str(),
            endpoint,
            &body,
        )?;

        let mut builder = self
            .http_client
            .request(method.clone(), url)
            .header("DC-ACCESS-KEY", &credentials.api_key)
            .header("DC-ACCESS-SIGN", signature)
            .header("DC-ACCESS-TIMESTAMP", timestamp)
            .header("DC-ACCESS-PASSPHRASE", &credentials.passphrase);

        if method != Method::GET && !body.is_empty() {
            builder = builder
                .header("Content-Type", "application/json")
                .body(body);
        }

        Ok(builder)
    }

    /// Send a request and unwrap the `{code, msg, data}` envelope
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(DeepcoinError::api_error(status, text));
        }

        let data = unwrap_envelope(&text)?;
        debug!(status = status.as_u16(), bytes = text.len(), "deepcoin response");
        Ok(serde_json::from_value(data)?)
    }
}

/// `code` of "0"/"00000" or no code at all means success; `data` is
/// returned when present, otherwise the whole body.
fn unwrap_envelope(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let mut body: Value = serde_json::from_str(text)
        .map_err(|err| DeepcoinError::InvalidResponse(format!("{err}: {text}")))?;

    let code = body
        .get("code")
        .or_else(|| body.get("error_code"))
        .and_then(|code| match code {
            Value::String(code) if !code.is_empty() => Some(code.clone()),
            Value::Number(code) => Some(code.to_string()),
            _ => None,
        });

    if let Some(code) = code
        && code != "0"
        && code != "00000"
    {
        let message = body
            .get("msg")
            .or_else(|| body.get("message"))
            .and_then(Value::as_str)
            .unwrap_or(text)
            .to_string();
        return Err(DeepcoinError::Api { code, message });
    }

    if let Some(data) = body.get_mut("data") {
        return Ok(data.take());
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope_success_returns_data() {
        let data = unwrap_envelope(r#"{"code":"0","msg":"","data":{"listenkey":"k"}}"#).unwrap();
        assert_eq!(data, json!({"listenkey": "k"}));
    }

    #[test]
    fn test_unwrap_envelope_without_code_returns_body() {
        let data = unwrap_envelope(r#"{"listenkey":"k"}"#).unwrap();
        assert_eq!(data, json!({"listenkey": "k"}));
        assert_eq!(unwrap_envelope("").unwrap(), json!({}));
    }

    #[test]
    fn test_unwrap_envelope_error_code() {
        let err = unwrap_envelope(r#"{"code":"51000","msg":"Parameter error","data":null}"#)
            .unwrap_err();
        match err {
            DeepcoinError::Api { code, message } => {
                assert_eq!(code, "51000");
                assert_eq!(message, "Parameter error");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_unwrap_envelope_invalid_json() {
        assert!(matches!(
            unwrap_envelope("<html>"),
            Err(DeepcoinError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_signed_request_requires_credentials() {
        let client = DeepcoinClient::new().unwrap();
        let err = client
            .signed_request(Method::GET, "/deepcoin/listenkey/acquire", None)
            .unwrap_err();
        assert!(matches!(err, DeepcoinError::Config(_)));
    }
}
