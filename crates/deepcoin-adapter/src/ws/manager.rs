/*
[INPUT]:  Endpoint, consumer callbacks, subscribe/unsubscribe intents
[OUTPUT]: Correlated wire requests on the connection, decoded events routed to callbacks
[POS]:    WebSocket layer - orchestration of connection, dispatcher and codec
[UPDATE]: When adding subscription helpers or changing manager lifecycle
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{DeepcoinError, Result};
use crate::http::ListenKeyProvider;
use crate::types::{TopicId, TopicKey};
use crate::ws::connection::{Connection, ConnectionConfig, ConnectionHandler, ConnectionState};
use crate::ws::dispatcher::Dispatcher;
use crate::ws::endpoint::Endpoint;
use crate::ws::topics::{self, PushMessage, SubscriptionRequest, WireMessage};
use crate::ws::transport::{Transport, TungsteniteTransport};

/// Correlation numbers below this are left to the exchange.
const LOCAL_NO_SEED: u64 = 1000;
const RAW_LOG_MAX_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

/// Bridges connection callbacks into the dispatcher.
struct ManagerHandler {
    endpoint: &'static str,
    dispatcher: Arc<Dispatcher>,
}

impl ConnectionHandler for ManagerHandler {
    fn on_open(&self) {
        info!(endpoint = self.endpoint, "WebSocket connected");
    }

    fn on_message(&self, text: &str) {
        match topics::decode(text) {
            Ok(message) => {
                self.dispatcher.dispatch(&message);
            }
            Err(err) => {
                warn!(
                    endpoint = self.endpoint,
                    error = %err,
                    bytes = text.len(),
                    "dropping undecodable frame"
                );
                debug!(
                    endpoint = self.endpoint,
                    message = %truncate_for_log(text, RAW_LOG_MAX_BYTES),
                    "undecodable frame"
                );
            }
        }
    }

    fn on_close(&self) {
        info!(endpoint = self.endpoint, "WebSocket disconnected");
    }

    fn on_error(&self, error: &DeepcoinError) {
        error!(endpoint = self.endpoint, error = %error, "WebSocket error");
    }
}

/// WebSocket manager for one Deepcoin endpoint.
///
/// Lifecycle is Idle -> Running -> Stopped. A stopped manager cannot be
/// started again; build a new one. `stop` also drops every registered
/// callback. Subscriptions are not remembered: after the connection drops
/// the caller may `start` again and must re-subscribe.
pub struct DeepcoinWebsocketManager {
    endpoint: Endpoint,
    dispatcher: Arc<Dispatcher>,
    connection: Connection,
    local_no: AtomicU64,
    phase: Mutex<Phase>,
}

impl DeepcoinWebsocketManager {
    /// Manager over the real WebSocket transport with default settings
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        Self::with_transport(
            endpoint,
            Arc::new(TungsteniteTransport),
            ConnectionConfig::default(),
        )
    }

    pub fn with_transport(
        endpoint: Endpoint,
        transport: Arc<dyn Transport>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let url = endpoint.url()?;
        let dispatcher = Arc::new(Dispatcher::new());
        let handler = Arc::new(ManagerHandler {
            endpoint: endpoint.label(),
            dispatcher: dispatcher.clone(),
        });
        let connection = Connection::new(url, transport, handler, config);

        Ok(Self {
            endpoint,
            dispatcher,
            connection,
            local_no: AtomicU64::new(LOCAL_NO_SEED),
            phase: Mutex::new(Phase::Idle),
        })
    }

    /// Acquire a listen key and build a manager for the private stream
    pub async fn connect_private<P>(provider: &P, config: ConnectionConfig) -> Result<Self>
    where
        P: ListenKeyProvider + ?Sized,
    {
        Self::connect_private_with_transport(provider, Arc::new(TungsteniteTransport), config).await
    }

    pub async fn connect_private_with_transport<P>(
        provider: &P,
        transport: Arc<dyn Transport>,
        config: ConnectionConfig,
    ) -> Result<Self>
    where
        P: ListenKeyProvider + ?Sized,
    {
        let key = provider.acquire_listen_key().await?;
        Self::with_transport(
            Endpoint::Private {
                listen_key: key.listen_key,
            },
            transport,
            config,
        )
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    // -------------------------
    // WebSocket lifecycle
    // -------------------------

    /// Start the background receive loop; returns before the handshake ends.
    pub fn start(&self) {
        // Held across `connection.start` so a concurrent `stop` either sees
        // the spawned loop or makes this call a no-op.
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == Phase::Stopped {
            warn!(
                endpoint = self.endpoint.label(),
                "start ignored: manager was stopped, construct a new one"
            );
            return;
        }
        *phase = Phase::Running;
        info!(endpoint = self.endpoint.label(), "Starting Deepcoin WS manager");
        self.connection.start();
    }

    /// Stop the connection, wait for the receive loop and drop all callbacks.
    pub async fn stop(&self) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = Phase::Stopped;
        info!(endpoint = self.endpoint.label(), "Stopping Deepcoin WS manager");
        self.connection.stop().await;
        self.dispatcher.clear();
    }

    pub fn is_alive(&self) -> bool {
        self.connection.is_alive()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    /// Wait for the handshake to settle; true iff the connection is open.
    pub async fn wait_until_alive(&self, timeout: Duration) -> bool {
        self.connection.wait_until_open(timeout).await
    }

    // -------------------------
    // Callback registration
    // -------------------------

    /// Register the consumer for a topic, replacing any previous one.
    pub fn register_callback<F>(&self, topic: impl Into<TopicKey>, callback: F)
    where
        F: Fn(&PushMessage) + Send + Sync + 'static,
    {
        self.dispatcher.register(topic, callback);
    }

    pub fn unregister_callback(&self, topic: impl Into<TopicKey>) {
        self.dispatcher.unregister(topic);
    }

    pub fn registered_topics(&self) -> Vec<TopicKey> {
        self.dispatcher.registered_topics()
    }

    // -------------------------
    // Subscription helpers
    // -------------------------

    /// Subscribe to a public topic; returns the correlation number used.
    pub async fn subscribe(&self, topic: TopicId, symbol: &str, period: Option<&str>) -> Result<u64> {
        let request = SubscriptionRequest::new(topic, symbol, period)?;
        self.ensure_running()?;
        let local_no = self.next_local_no();
        self.send(&request.subscribe(local_no)).await?;
        Ok(local_no)
    }

    /// Market ticker/overview (TopicID=7)
    pub async fn subscribe_market_data(&self, symbol: &str) -> Result<u64> {
        self.subscribe(TopicId::LatestMarketData, symbol, None).await
    }

    /// Last trade updates (TopicID=2)
    pub async fn subscribe_trade(&self, symbol: &str) -> Result<u64> {
        self.subscribe(TopicId::LastTransactions, symbol, None).await
    }

    /// Kline updates (TopicID=11)
    pub async fn subscribe_kline(&self, symbol: &str, period: &str) -> Result<u64> {
        self.subscribe(TopicId::Kline, symbol, Some(period)).await
    }

    /// 25-depth incremental orderbook (TopicID=25)
    pub async fn subscribe_orderbook(&self, symbol: &str) -> Result<u64> {
        self.subscribe(TopicId::Orderbook25, symbol, None).await
    }

    pub async fn unsubscribe(&self, topic: TopicId, symbol: &str, period: Option<&str>) -> Result<u64> {
        let request = SubscriptionRequest::new(topic, symbol, period)?;
        self.ensure_running()?;
        let local_no = self.next_local_no();
        self.send(&request.unsubscribe(local_no)).await?;
        Ok(local_no)
    }

    pub async fn unsubscribe_all(&self) -> Result<u64> {
        self.ensure_running()?;
        let local_no = self.next_local_no();
        self.send(&topics::encode_unsubscribe_all(local_no)).await?;
        Ok(local_no)
    }

    /// Serialize and write one request frame.
    pub async fn send(&self, message: &WireMessage) -> Result<()> {
        self.ensure_running()?;
        let text = message.to_json()?;
        self.connection.send(text).await?;
        info!(
            endpoint = self.endpoint.label(),
            action = ?message.action,
            topic = ?message.topic_id.map(|topic| topic.code()),
            symbol = message.symbol.as_deref().unwrap_or(""),
            local_no = message.local_no,
            "ws request sent"
        );
        Ok(())
    }

    // -------------------------
    // Internal helpers
    // -------------------------

    fn ensure_running(&self) -> Result<()> {
        let phase = *self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if phase != Phase::Running || !self.connection.is_alive() {
            return Err(DeepcoinError::NotConnected);
        }
        Ok(())
    }

    /// Next correlation number; strictly increasing per manager.
    fn next_local_no(&self) -> u64 {
        self.local_no.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl std::fmt::Debug for DeepcoinWebsocketManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeepcoinWebsocketManager")
            .field("endpoint", &self.endpoint)
            .field("state", &self.connection.state())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn idle_manager() -> DeepcoinWebsocketManager {
        let (transport, _peer) = crate::ws::transport::loopback();
        DeepcoinWebsocketManager::with_transport(
            Endpoint::PublicFutures,
            Arc::new(transport),
            ConnectionConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_local_no_starts_above_reserved_range() {
        let manager = idle_manager();
        assert_eq!(manager.next_local_no(), 1001);
        assert_eq!(manager.next_local_no(), 1002);
    }

    #[test]
    fn test_local_no_unique_under_concurrency() {
        let manager = Arc::new(idle_manager());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || (0..250).map(|_| manager.next_local_no()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for local_no in handle.join().unwrap() {
                assert!(local_no > LOCAL_NO_SEED);
                assert!(seen.insert(local_no), "duplicate local_no {local_no}");
            }
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn test_private_endpoint_without_key_is_rejected() {
        let (transport, _peer) = crate::ws::transport::loopback();
        let result = DeepcoinWebsocketManager::with_transport(
            Endpoint::Private {
                listen_key: String::new(),
            },
            Arc::new(transport),
            ConnectionConfig::default(),
        );
        assert!(matches!(result, Err(DeepcoinError::InvalidArgument(_))));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("abc", 10), "abc");
        assert_eq!(truncate_for_log("abcdef", 3), "abc...");
        assert_eq!(truncate_for_log("ééé", 3), "é...");
    }

    #[test]
    fn test_handler_drops_undecodable_frames() {
        let dispatcher = Arc::new(Dispatcher::new());
        let handler = ManagerHandler {
            endpoint: "test",
            dispatcher: dispatcher.clone(),
        };
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        dispatcher.register(TopicId::Kline, move |_: &PushMessage| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handler.on_message("{not json");
        handler.on_message(r#"{"action":"PushKLine","result":[]}"#);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
