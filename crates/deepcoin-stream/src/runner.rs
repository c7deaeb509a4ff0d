/*
[INPUT]:  Validated StreamConfig, a WebSocket manager, shutdown token
[OUTPUT]: Logged push events, re-subscription after reconnect, listen-key upkeep
[POS]:    Runtime layer - drives one manager until shutdown
[UPDATE]: When changing reconnection backoff, callbacks, or shutdown semantics
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use deepcoin_adapter::ws::TungsteniteTransport;
use deepcoin_adapter::{
    ClientConfig,
    ConnectionState,
    DeepcoinClient,
    DeepcoinWebsocketManager,
    Endpoint,
    PushAction,
    PushMessage,
    TopicKey,
};

use crate::config::{EndpointKind, StreamConfig};

/// Private pushes the runner logs
const PRIVATE_ACTIONS: [PushAction; 6] = [
    PushAction::Order,
    PushAction::Account,
    PushAction::Position,
    PushAction::Trade,
    PushAction::AccountDetail,
    PushAction::TriggerOrder,
];

/// Listen key plus the client that keeps it alive
struct ListenKeyLease {
    client: DeepcoinClient,
    listen_key: String,
}

pub struct StreamRunner {
    config: StreamConfig,
    manager: DeepcoinWebsocketManager,
    lease: Option<Arc<ListenKeyLease>>,
    events: Arc<AtomicU64>,
}

impl StreamRunner {
    /// Build the manager for the configured endpoint; the private endpoint
    /// acquires its listen key here.
    pub async fn connect(config: StreamConfig) -> anyhow::Result<Self> {
        let transport = Arc::new(TungsteniteTransport);
        let connection_config = config.connection_config();

        match config.endpoint {
            EndpointKind::Futures | EndpointKind::Spot => {
                let endpoint = match config.endpoint {
                    EndpointKind::Spot => Endpoint::PublicSpot,
                    _ => Endpoint::PublicFutures,
                };
                let manager =
                    DeepcoinWebsocketManager::with_transport(endpoint, transport, connection_config)?;
                Ok(Self::with_manager(config, manager))
            }
            EndpointKind::Private => {
                let client = rest_client(&config)?;
                let manager = DeepcoinWebsocketManager::connect_private_with_transport(
                    &client,
                    transport,
                    connection_config,
                )
                .await
                .context("acquire listen key")?;
                let listen_key = match manager.endpoint() {
                    Endpoint::Private { listen_key } => listen_key.clone(),
                    _ => return Err(anyhow!("private manager has a public endpoint")),
                };
                Ok(Self::with_manager(config, manager).with_listen_key(client, listen_key))
            }
        }
    }

    pub fn with_manager(config: StreamConfig, manager: DeepcoinWebsocketManager) -> Self {
        Self {
            config,
            manager,
            lease: None,
            events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Keep `listen_key` alive through `client` while running.
    pub fn with_listen_key(mut self, client: DeepcoinClient, listen_key: String) -> Self {
        self.lease = Some(Arc::new(ListenKeyLease { client, listen_key }));
        self
    }

    pub fn manager(&self) -> &DeepcoinWebsocketManager {
        &self.manager
    }

    /// Push events delivered to the runner's callbacks so far
    pub fn events_received(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// One logging callback per configured topic, or per private action.
    pub fn register_callbacks(&self) {
        let mut topics: Vec<TopicKey> = match self.config.endpoint {
            EndpointKind::Private => PRIVATE_ACTIONS.iter().cloned().map(TopicKey::from).collect(),
            EndpointKind::Futures | EndpointKind::Spot => self
                .config
                .subscriptions
                .iter()
                .map(|subscription| TopicKey::from(subscription.topic.topic_id()))
                .collect(),
        };
        topics.dedup();

        for topic in topics {
            let events = self.events.clone();
            self.manager.register_callback(topic, move |message: &PushMessage| {
                let count = events.fetch_add(1, Ordering::Relaxed) + 1;
                info!(topic = %message.topic, count, "push event");
                debug!(topic = %message.topic, payload = %message.payload, "push payload");
            });
        }

        self.manager
            .register_callback(PushAction::TopicAck, |message: &PushMessage| {
                debug!(payload = %message.payload, "subscription acknowledged");
            });
    }

    /// Send every configured subscription; returns the correlation numbers.
    pub async fn apply_subscriptions(&self) -> deepcoin_adapter::Result<Vec<u64>> {
        let mut local_nos = Vec::with_capacity(self.config.subscriptions.len());
        for subscription in &self.config.subscriptions {
            let local_no = self
                .manager
                .subscribe(
                    subscription.topic.topic_id(),
                    &subscription.symbol,
                    subscription.period.as_deref(),
                )
                .await?;
            local_nos.push(local_no);
        }
        Ok(local_nos)
    }

    /// Run until `shutdown` fires or reconnecting gives up.
    ///
    /// The manager never reconnects on its own; this loop restarts it with
    /// exponential backoff and re-subscribes after each open.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        self.register_callbacks();
        let refresher = self.spawn_listen_key_refresh(shutdown.child_token());

        let outcome = self.connect_loop(&shutdown).await;

        if self.manager.is_alive() && !self.config.subscriptions.is_empty() {
            if let Err(err) = self.manager.unsubscribe_all().await {
                warn!(error = %err, "unsubscribe_all failed during shutdown");
            }
        }
        self.manager.stop().await;
        info!(events = self.events_received(), "stream stopped");

        if let Some(handle) = refresher {
            handle.abort();
        }
        outcome
    }

    async fn connect_loop(&self, shutdown: &CancellationToken) -> anyhow::Result<()> {
        let mut retry_count: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            self.manager.start();
            let opened = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                opened = self.manager.wait_until_alive(self.config.connect_timeout()) => opened,
            };

            if opened {
                retry_count = 0;
                info!(endpoint = self.manager.endpoint().label(), "stream connected");

                match self.apply_subscriptions().await {
                    Ok(local_nos) if !local_nos.is_empty() => {
                        info!(?local_nos, "subscriptions sent");
                    }
                    Ok(_) => {}
                    Err(err) if err.is_connection_error() => {
                        warn!(error = %err, "subscribing interrupted by disconnect");
                    }
                    Err(err) => {
                        warn!(error = %err, "subscription rejected; stopping");
                        return Err(err).context("apply subscriptions");
                    }
                }

                let state = tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    state = wait_for_disconnect(self.manager.connection_state()) => state,
                };
                warn!(?state, "stream disconnected");
                continue;
            }

            retry_count = retry_count.saturating_add(1);
            let state = self.manager.connection_state().borrow().clone();
            if retry_count >= self.config.max_retries {
                warn!(retry_count, ?state, "stream gave up reconnecting");
                return Err(anyhow!(
                    "stream failed to connect after {retry_count} attempts: {state:?}"
                ));
            }

            let backoff = backoff_duration(retry_count);
            warn!(retry_count, ?backoff, ?state, "stream connect failed; retrying with backoff");
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    fn spawn_listen_key_refresh(&self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let lease = self.lease.clone()?;
        let every = Duration::from_secs(self.config.listen_key_refresh_secs.max(1));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match lease.client.extend_listen_key(&lease.listen_key).await {
                            Ok(key) => debug!(expire_time = key.expire_time, "listen key refreshed"),
                            Err(err) if err.is_retryable() => {
                                warn!(error = %err, "listen key refresh failed; retrying next tick");
                            }
                            Err(err) => {
                                warn!(error = %err, "listen key refresh rejected; giving up");
                                break;
                            }
                        }
                    }
                }
            }
        }))
    }
}

fn rest_client(config: &StreamConfig) -> anyhow::Result<DeepcoinClient> {
    let credentials = config
        .credentials()
        .context("the private endpoint requires api credentials")?;
    let mut client = match config.rest_base_url.as_deref() {
        Some(base_url) => DeepcoinClient::with_config_and_base_url(ClientConfig::default(), base_url)?,
        None => DeepcoinClient::with_config(ClientConfig::default())?,
    };
    client.set_credentials(credentials);
    Ok(client)
}

async fn wait_for_disconnect(mut state: watch::Receiver<ConnectionState>) -> ConnectionState {
    match state.wait_for(ConnectionState::is_terminal).await {
        Ok(state) => state.clone(),
        Err(_) => ConnectionState::Closed,
    }
}

fn backoff_duration(retry_count: u32) -> Duration {
    let exp = retry_count.saturating_sub(1).min(63);
    let secs = 1u64 << exp;
    Duration::from_secs(secs.min(30))
}
