/*
[INPUT]:  WebSocket URL
[OUTPUT]: Duplex session split into a frame writer and a frame reader
[POS]:    WebSocket layer - seam between Connection and the socket library
[UPDATE]: When swapping the socket library or changing frame handling
*/

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::{DeepcoinError, Result};

/// Transport-neutral WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

#[async_trait]
pub trait FrameWriter: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Start the close handshake.
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait FrameReader: Send {
    /// `None` once the peer has gone away.
    async fn next(&mut self) -> Option<Result<Frame>>;
}

/// An established duplex session
pub struct Session {
    pub writer: Box<dyn FrameWriter>,
    pub reader: Box<dyn FrameReader>,
}

#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn connect(&self, url: &str) -> Result<Session>;
}

/// Production transport backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteTransport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TungsteniteWriter {
    sink: SplitSink<WsStream, WsMessage>,
}

struct TungsteniteReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<Session> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|err| DeepcoinError::Transport(err.to_string()))?;
        let (sink, stream) = ws_stream.split();

        Ok(Session {
            writer: Box::new(TungsteniteWriter { sink }),
            reader: Box::new(TungsteniteReader { stream }),
        })
    }
}

#[async_trait]
impl FrameWriter for TungsteniteWriter {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(bytes) => WsMessage::Binary(bytes.into()),
            Frame::Ping(bytes) => WsMessage::Ping(bytes.into()),
            Frame::Pong(bytes) => WsMessage::Pong(bytes.into()),
            Frame::Close => WsMessage::Close(None),
        };
        self.sink
            .send(message)
            .await
            .map_err(|err| DeepcoinError::Send(err.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|err| DeepcoinError::Transport(err.to_string()))
    }
}

#[async_trait]
impl FrameReader for TungsteniteReader {
    async fn next(&mut self) -> Option<Result<Frame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(DeepcoinError::Transport(err.to_string()))),
            };
            let frame = match message {
                WsMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
                WsMessage::Binary(bytes) => Frame::Binary(bytes.to_vec()),
                WsMessage::Ping(bytes) => Frame::Ping(bytes.to_vec()),
                WsMessage::Pong(bytes) => Frame::Pong(bytes.to_vec()),
                WsMessage::Close(_) => Frame::Close,
                WsMessage::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }
}

/// Create an in-memory transport and the peer that plays the server side.
///
/// Every `connect` hands a fresh [`LoopbackSession`] to the peer.
pub fn loopback() -> (LoopbackTransport, LoopbackPeer) {
    let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
    let refuse = Arc::new(AtomicBool::new(false));
    (
        LoopbackTransport {
            sessions_tx,
            refuse: refuse.clone(),
        },
        LoopbackPeer {
            sessions_rx,
            refuse,
        },
    )
}

#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    sessions_tx: mpsc::UnboundedSender<LoopbackSession>,
    refuse: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct LoopbackPeer {
    sessions_rx: mpsc::UnboundedReceiver<LoopbackSession>,
    refuse: Arc<AtomicBool>,
}

/// Server side of one loopback connection
#[derive(Debug)]
pub struct LoopbackSession {
    pub url: String,
    to_client: mpsc::UnboundedSender<Frame>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

struct LoopbackWriter {
    to_peer: mpsc::UnboundedSender<Frame>,
}

struct LoopbackReader {
    from_peer: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&self, url: &str) -> Result<Session> {
        if self.refuse.load(Ordering::Acquire) {
            return Err(DeepcoinError::Transport(format!(
                "loopback refused connection to {url}"
            )));
        }

        let (to_client, from_peer) = mpsc::unbounded_channel();
        let (to_peer, from_client) = mpsc::unbounded_channel();
        let session = LoopbackSession {
            url: url.to_string(),
            to_client,
            from_client,
        };
        self.sessions_tx
            .send(session)
            .map_err(|_| DeepcoinError::Transport("loopback peer dropped".to_string()))?;

        Ok(Session {
            writer: Box::new(LoopbackWriter { to_peer }),
            reader: Box::new(LoopbackReader { from_peer }),
        })
    }
}

#[async_trait]
impl FrameWriter for LoopbackWriter {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.to_peer
            .send(frame)
            .map_err(|_| DeepcoinError::Send("loopback peer closed".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        if self.to_peer.send(Frame::Close).is_err() {
            debug!("loopback peer already gone on close");
        }
        Ok(())
    }
}

#[async_trait]
impl FrameReader for LoopbackReader {
    async fn next(&mut self) -> Option<Result<Frame>> {
        self.from_peer.recv().await.map(Ok)
    }
}

impl LoopbackPeer {
    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> Option<LoopbackSession> {
        self.sessions_rx.recv().await
    }

    /// Make subsequent handshakes fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Release);
    }
}

impl LoopbackSession {
    pub fn push_text(&self, text: impl Into<String>) -> Result<()> {
        self.push(Frame::Text(text.into()))
    }

    pub fn push(&self, frame: Frame) -> Result<()> {
        self.to_client
            .send(frame)
            .map_err(|_| DeepcoinError::Send("loopback client closed".to_string()))
    }

    /// Next frame the client wrote, `None` once the client side is gone.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Next text frame the client wrote, skipping heartbeat pings.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.from_client.recv().await? {
                Frame::Text(text) if text == "ping" => continue,
                Frame::Text(text) => return Some(text),
                _ => continue,
            }
        }
    }

    /// Frames already written by the client, without waiting.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }
}
