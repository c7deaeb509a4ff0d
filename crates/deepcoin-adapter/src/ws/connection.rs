/*
[INPUT]:  Endpoint URL, Transport, ConnectionHandler callbacks
[OUTPUT]: One duplex session with a background receive loop and serialized sends
[POS]:    WebSocket layer - connection lifecycle (start/stop/liveness/send)
[UPDATE]: When changing lifecycle states, heartbeat or teardown ordering
*/

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{DeepcoinError, Result};
use crate::ws::transport::{Frame, FrameReader, FrameWriter, Session, Transport};

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const HEARTBEAT_PING: &str = "ping";
const HEARTBEAT_PONG: &str = "pong";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Errored(String),
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// The session is over, either on request or because the peer went away.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Errored(_))
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Interval of the text `ping` heartbeat, `None` disables it
    pub ping_interval: Option<Duration>,
    pub handshake_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Some(DEFAULT_PING_INTERVAL),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Lifecycle callbacks, invoked from the receive loop task.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn on_open(&self) {}

    fn on_message(&self, text: &str);

    fn on_close(&self) {}

    fn on_error(&self, _error: &DeepcoinError) {}
}

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Receive loop bookkeeping, guarded by one lock so `start` and `stop`
/// cannot interleave.
#[derive(Default)]
struct Workers {
    current: Option<Worker>,
    /// Loops that reported a terminal state but may still be returning
    retired: Vec<JoinHandle<()>>,
    stopped: bool,
}

/// A single WebSocket session with its own receive loop.
///
/// `start` spawns the loop and returns at once; `stop` waits for the loop to
/// exit, so no handler callback runs after it returns. Do not call `stop`
/// from inside a handler callback: the loop would wait on itself.
pub struct Connection {
    url: String,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn ConnectionHandler>,
    config: ConnectionConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    writer: Arc<Mutex<Option<Box<dyn FrameWriter>>>>,
    workers: StdMutex<Workers>,
}

impl Connection {
    pub fn new(
        url: impl Into<String>,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn ConnectionHandler>,
        config: ConnectionConfig,
    ) -> Self {
        let (state, _rx) = watch::channel(ConnectionState::Idle);
        Self {
            url: url.into(),
            transport,
            handler,
            config,
            state: Arc::new(state),
            writer: Arc::new(Mutex::new(None)),
            workers: StdMutex::new(Workers::default()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn the receive loop. Handshake failures surface through
    /// `on_error` and the `Errored` state, never here.
    ///
    /// A no-op while a loop is running or after `stop`. Once a session has
    /// ended on its own, calling `start` again opens a new one.
    pub fn start(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers.stopped {
            warn!(url = %self.url, "start ignored: connection was stopped");
            return;
        }

        if let Some(existing) = workers.current.as_ref()
            && !existing.handle.is_finished()
            && !self.state.borrow().is_terminal()
        {
            debug!(url = %self.url, "start ignored: receive loop already running");
            return;
        }

        // A loop publishes its terminal state as its last step; keep its
        // handle so `stop` still joins it.
        if let Some(previous) = workers.current.take()
            && !previous.handle.is_finished()
        {
            workers.retired.push(previous.handle);
        }
        workers.retired.retain(|handle| !handle.is_finished());

        if tokio::runtime::Handle::try_current().is_err() {
            let err = DeepcoinError::Transport("no tokio runtime to run the receive loop".into());
            error!(url = %self.url, error = %err, "websocket start failed");
            self.handler.on_error(&err);
            self.state.send_replace(ConnectionState::Errored(err.to_string()));
            return;
        }

        let shutdown = CancellationToken::new();
        self.state.send_replace(ConnectionState::Connecting);

        let receive_loop = ReceiveLoop {
            url: self.url.clone(),
            transport: self.transport.clone(),
            handler: self.handler.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            writer: self.writer.clone(),
            shutdown: shutdown.clone(),
        };
        let handle = tokio::spawn(receive_loop.run());
        workers.current = Some(Worker { shutdown, handle });
    }

    /// Stop the receive loop and close the transport.
    pub async fn stop(&self) {
        let (current, retired) = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.stopped = true;
            (workers.current.take(), std::mem::take(&mut workers.retired))
        };

        let mut handles = retired;
        if let Some(Worker { shutdown, handle }) = current {
            shutdown.cancel();
            handles.push(handle);
        }
        for handle in handles {
            if let Err(err) = handle.await {
                error!(url = %self.url, error = %err, "receive loop task failed");
            }
        }

        self.state.send_replace(ConnectionState::Closed);
    }

    pub fn is_alive(&self) -> bool {
        self.state.borrow().is_open()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Wait until the handshake settles; true iff the connection is open.
    pub async fn wait_until_open(&self, timeout: Duration) -> bool {
        let mut rx = self.state.subscribe();
        let settled = rx.wait_for(|state| {
            !matches!(state, ConnectionState::Idle | ConnectionState::Connecting)
        });
        match tokio::time::timeout(timeout, settled).await {
            Ok(Ok(state)) => state.is_open(),
            _ => false,
        }
    }

    /// Write one text frame. Writers are serialized by a single lock.
    pub async fn send(&self, text: String) -> Result<()> {
        if !self.is_alive() {
            return Err(DeepcoinError::NotConnected);
        }
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(DeepcoinError::NotConnected)?;
        writer.send(Frame::Text(text)).await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let workers = self.workers.get_mut().unwrap_or_else(PoisonError::into_inner);
        workers.stopped = true;
        if let Some(worker) = workers.current.take() {
            worker.shutdown.cancel();
        }
    }
}

enum LoopExit {
    Shutdown,
    RemoteClosed,
    Failed(DeepcoinError),
}

struct ReceiveLoop {
    url: String,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn ConnectionHandler>,
    config: ConnectionConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    writer: Arc<Mutex<Option<Box<dyn FrameWriter>>>>,
    shutdown: CancellationToken,
}

impl ReceiveLoop {
    async fn run(self) {
        info!(url = %self.url, "connecting websocket");
        let connect = tokio::time::timeout(
            self.config.handshake_timeout,
            self.transport.connect(&self.url),
        );

        let session = tokio::select! {
            _ = self.shutdown.cancelled() => {
                self.state.send_replace(ConnectionState::Closed);
                return;
            }
            result = connect => match result {
                Ok(Ok(session)) => session,
                Ok(Err(err)) => {
                    self.fail(err);
                    return;
                }
                Err(_) => {
                    self.fail(DeepcoinError::Transport(format!(
                        "handshake timed out after {:?}",
                        self.config.handshake_timeout
                    )));
                    return;
                }
            }
        };

        let Session { writer, mut reader } = session;
        *self.writer.lock().await = Some(writer);
        self.state.send_replace(ConnectionState::Open);
        info!(url = %self.url, "websocket connected");
        self.handler.on_open();

        let exit = self.pump(reader.as_mut()).await;

        self.state.send_replace(ConnectionState::Closing);
        let writer = self.writer.lock().await.take();
        if let (LoopExit::Shutdown, Some(mut writer)) = (&exit, writer)
            && let Err(err) = writer.close().await
        {
            debug!(url = %self.url, error = %err, "close handshake failed");
        }

        match exit {
            LoopExit::Shutdown | LoopExit::RemoteClosed => {
                info!(url = %self.url, "websocket closed");
                self.handler.on_close();
                self.state.send_replace(ConnectionState::Closed);
            }
            LoopExit::Failed(err) => self.fail(err),
        }
    }

    async fn pump(&self, reader: &mut dyn FrameReader) -> LoopExit {
        let mut heartbeat = self.config.ping_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return LoopExit::Shutdown,
                _ = next_tick(&mut heartbeat) => self.send_heartbeat().await,
                frame = reader.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.deliver(&text),
                    Some(Ok(Frame::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => self.deliver(&text),
                        Err(err) => warn!(url = %self.url, error = %err, "dropping non-utf8 binary frame"),
                    },
                    Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => {}
                    Some(Ok(Frame::Close)) | None => return LoopExit::RemoteClosed,
                    Some(Err(err)) => return LoopExit::Failed(err),
                }
            }
        }
    }

    fn deliver(&self, text: &str) {
        if text.trim() == HEARTBEAT_PONG {
            trace!(url = %self.url, "heartbeat pong");
            return;
        }
        self.handler.on_message(text);
    }

    // A failed heartbeat does not end the session; the next read will.
    async fn send_heartbeat(&self) {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return;
        };
        if let Err(err) = writer.send(Frame::Text(HEARTBEAT_PING.to_string())).await {
            warn!(url = %self.url, error = %err, "heartbeat ping failed");
        }
    }

    // Terminal state goes out last: once observed, no callback of this
    // session is still running.
    fn fail(&self, err: DeepcoinError) {
        error!(url = %self.url, error = %err, "websocket error");
        self.handler.on_error(&err);
        self.state.send_replace(ConnectionState::Errored(err.to_string()));
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
