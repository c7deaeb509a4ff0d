/*
[INPUT]:  YAML configuration file and DEEPCOIN_* environment variables
[OUTPUT]: Parsed and validated stream configuration
[POS]:    Configuration layer - stream setup
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use anyhow::{Context, bail};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use deepcoin_adapter::ws::SubscriptionRequest;
use deepcoin_adapter::{ConnectionConfig, Credentials, TopicId};

/// Top-level configuration for the stream runner
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Which Deepcoin stream to connect to
    #[serde(default)]
    pub endpoint: EndpointKind,
    /// Topics to subscribe after every (re)connect; public endpoints only
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
    /// Heartbeat period, 0 disables the heartbeat
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Consecutive failed connects before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_listen_key_refresh_secs")]
    pub listen_key_refresh_secs: u64,
    /// REST credentials, required for the private endpoint
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Override of the REST host, e.g. a testnet
    #[serde(default)]
    pub rest_base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    #[default]
    Futures,
    Spot,
    Private,
}

/// One topic subscription
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubscriptionConfig {
    pub topic: TopicKind,
    /// Trading symbol (e.g., "BTCUSDT")
    pub symbol: String,
    /// Kline period (e.g., "1m"); kline only
    #[serde(default)]
    pub period: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    MarketData,
    Trade,
    Kline,
    Orderbook,
}

impl TopicKind {
    pub fn topic_id(self) -> TopicId {
        match self {
            TopicKind::MarketData => TopicId::LatestMarketData,
            TopicKind::Trade => TopicId::LastTransactions,
            TopicKind::Kline => TopicId::Kline,
            TopicKind::Orderbook => TopicId::Orderbook25,
        }
    }
}

impl SubscriptionConfig {
    pub fn to_request(&self) -> deepcoin_adapter::Result<SubscriptionRequest> {
        SubscriptionRequest::new(self.topic.topic_id(), &self.symbol, self.period.as_deref())
    }
}

fn default_ping_interval_secs() -> u64 {
    25
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    10
}

fn default_listen_key_refresh_secs() -> u64 {
    30 * 60
}

impl StreamConfig {
    /// Load configuration from a YAML file, with `DEEPCOIN_*` environment
    /// variables taking precedence (e.g. `DEEPCOIN_API_SECRET`).
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::new(path, FileFormat::Yaml))
            .add_source(
                Environment::with_prefix("DEEPCOIN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("read config {path}"))?;
        let config: Self = settings.try_deserialize().context("parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text only
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(content, FileFormat::Yaml))
            .build()
            .context("read config")?;
        let config: Self = settings.try_deserialize().context("parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.connect_timeout_secs == 0 {
            bail!("connect_timeout_secs must be positive");
        }

        match self.endpoint {
            EndpointKind::Private => {
                if !self.subscriptions.is_empty() {
                    bail!("the private endpoint pushes account events without topic subscriptions");
                }
                if self.credentials().is_none() {
                    bail!("the private endpoint requires api_key, api_secret and passphrase");
                }
                if self.listen_key_refresh_secs == 0 {
                    bail!("listen_key_refresh_secs must be positive");
                }
            }
            EndpointKind::Futures | EndpointKind::Spot => {
                for (index, subscription) in self.subscriptions.iter().enumerate() {
                    subscription
                        .to_request()
                        .with_context(|| format!("subscriptions[{index}]"))?;
                }
            }
        }

        Ok(())
    }

    /// Credentials when all three parts are present and non-empty
    pub fn credentials(&self) -> Option<Credentials> {
        let present = |value: &Option<String>| value.as_deref().filter(|v| !v.trim().is_empty()).map(str::to_string);
        Some(Credentials {
            api_key: present(&self.api_key)?,
            api_secret: present(&self.api_secret)?,
            passphrase: present(&self.passphrase)?,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            ping_interval: (self.ping_interval_secs > 0)
                .then(|| Duration::from_secs(self.ping_interval_secs)),
            handshake_timeout: self.connect_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply() {
        let config = StreamConfig::from_yaml_str(
            "subscriptions:\n  - topic: orderbook\n    symbol: BTCUSDT\n",
        )
        .unwrap();
        assert_eq!(config.endpoint, EndpointKind::Futures);
        assert_eq!(config.ping_interval_secs, 25);
        assert_eq!(config.max_retries, 10);
        assert_eq!(
            config.connection_config().ping_interval,
            Some(Duration::from_secs(25))
        );
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_zero_ping_interval_disables_heartbeat() {
        let config = StreamConfig::from_yaml_str("endpoint: spot\nping_interval_secs: 0\n").unwrap();
        assert_eq!(config.connection_config().ping_interval, None);
    }

    #[test]
    fn test_credentials_require_every_part() {
        let config = StreamConfig::from_yaml_str("api_key: k\napi_secret: s\npassphrase: \"\"\n").unwrap();
        assert!(config.credentials().is_none());
    }
}
