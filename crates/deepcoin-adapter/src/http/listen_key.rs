/*
[INPUT]:  API credentials
[OUTPUT]: Listen key authorizing the private WebSocket stream
[POS]:    HTTP layer - the only REST calls the stream layer depends on
[UPDATE]: When listen-key endpoints or their lifetime rules change
*/

// ### Listen Key Endpoints

use async_trait::async_trait;
use reqwest::Method;
use tracing::info;

use crate::error::{DeepcoinError, Result};
use crate::http::DeepcoinClient;
use crate::types::ListenKey;

/// Source of the session credential for the private stream
#[async_trait]
pub trait ListenKeyProvider: Send + Sync {
    async fn acquire_listen_key(&self) -> Result<ListenKey>;
}

/// A listen key obtained elsewhere
#[derive(Debug, Clone)]
pub struct StaticListenKey(pub String);

#[async_trait]
impl ListenKeyProvider for StaticListenKey {
    async fn acquire_listen_key(&self) -> Result<ListenKey> {
        if self.0.trim().is_empty() {
            return Err(DeepcoinError::InvalidArgument(
                "listen key must not be empty".to_string(),
            ));
        }
        Ok(ListenKey {
            listen_key: self.0.clone(),
            expire_time: 0,
        })
    }
}

impl DeepcoinClient {
    /// Acquire a listen key for the private stream
    ///
    /// GET /deepcoin/listenkey/acquire
    pub async fn acquire_listen_key(&self) -> Result<ListenKey> {
        let builder = self.signed_request(Method::GET, "/deepcoin/listenkey/acquire", None)?;
        let key: ListenKey = self.send_json(builder).await?;
        info!(expire_time = key.expire_time, "listen key acquired");
        Ok(key)
    }

    /// Extend the lifetime of an existing listen key
    ///
    /// GET /deepcoin/listenkey/extend?listenkey={listen_key}
    pub async fn extend_listen_key(&self, listen_key: &str) -> Result<ListenKey> {
        if listen_key.trim().is_empty() {
            return Err(DeepcoinError::InvalidArgument(
                "listen key must not be empty".to_string(),
            ));
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("listenkey", listen_key)
            .finish();
        let endpoint = format!("/deepcoin/listenkey/extend?{query}");
        let builder = self.signed_request(Method::GET, &endpoint, None)?;
        let key: ListenKey = self.send_json(builder).await?;
        info!(expire_time = key.expire_time, "listen key extended");
        Ok(key)
    }
}

#[async_trait]
impl ListenKeyProvider for DeepcoinClient {
    async fn acquire_listen_key(&self) -> Result<ListenKey> {
        DeepcoinClient::acquire_listen_key(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_listen_key() {
        let key = StaticListenKey("abc".to_string()).acquire_listen_key().await.unwrap();
        assert_eq!(key.listen_key, "abc");

        let err = StaticListenKey(String::new()).acquire_listen_key().await.unwrap_err();
        assert!(matches!(err, DeepcoinError::InvalidArgument(_)));
    }
}
