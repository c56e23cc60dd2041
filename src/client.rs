//! Client implementation
//!
//! Connects to a hub, performs the dialect's handshake and runs a receive
//! task that turns incoming frames into events. `disconnect` stops that task
//! and takes its reader back, so the echo summary can be awaited on the same
//! socket before it is closed.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::{self, FrameReader, FrameWriter, ReadOutcome};
use crate::error::{ConnectError, SendError};
use crate::event::{EventReceiver, EventSender, Status};
use crate::message::{self, CLOSE_SENTINEL};
use crate::types::{ClientState, Dialect};

/// Chat or echo client
pub struct Client {
    dialect: Dialect,
    config: ClientConfig,
    events: EventSender,
    inner: Arc<Mutex<ClientInner>>,
}

#[derive(Debug)]
struct ClientInner {
    state: ClientState,
    nickname: Option<String>,
    /// Present iff `state` is `Connected`
    link: Option<Link>,
    /// Bumped on every successful connect
    generation: u64,
}

#[derive(Debug)]
struct Link {
    writer: FrameWriter,
    shutdown: watch::Sender<bool>,
    receiver: JoinHandle<Option<FrameReader>>,
}

impl Client {
    /// Create a disconnected client and the receiver for its events
    pub fn new(dialect: Dialect, config: ClientConfig) -> (Self, EventReceiver) {
        let (events, rx) = EventSender::channel();
        let client = Self {
            dialect,
            config,
            events,
            inner: Arc::new(Mutex::new(ClientInner {
                state: ClientState::Disconnected,
                nickname: None,
                link: None,
                generation: 0,
            })),
        };
        (client, rx)
    }

    pub fn chat(config: ClientConfig) -> (Self, EventReceiver) {
        Self::new(Dialect::Chat, config)
    }

    pub fn echo(config: ClientConfig) -> (Self, EventReceiver) {
        Self::new(Dialect::Echo, config)
    }

    pub async fn state(&self) -> ClientState {
        self.inner.lock().await.state
    }

    /// Nickname in use while connected
    pub async fn nickname(&self) -> Option<String> {
        self.inner.lock().await.nickname.clone()
    }

    /// Connect to `host:port`
    ///
    /// The chat dialect registers `nickname` (or "Anonymous" when blank)
    /// with the first frame. Nothing is retried on failure.
    pub async fn connect(&self, host: &str, port: u16, nickname: &str) -> Result<(), ConnectError> {
        if port == 0 {
            return Err(ConnectError::InvalidPort);
        }

        {
            let mut inner = self.inner.lock().await;
            if inner.state != ClientState::Disconnected {
                return Err(ConnectError::AlreadyConnected);
            }
            inner.state = ClientState::Connecting;
        }

        let nickname = message::nickname_or_default(nickname).to_string();
        let (reader, writer) = match self.open(host, port, &nickname).await {
            Ok(halves) => halves,
            Err(e) => {
                self.inner.lock().await.state = ClientState::Disconnected;
                warn!("Connect to {}:{} failed: {}", host, port, e);
                self.events.error(format!("Could not connect to server: {e}"));
                return Err(e);
            }
        };

        let mut inner = self.inner.lock().await;
        inner.generation += 1;

        info!("Connected to {}:{} as '{}'", host, port, nickname);
        self.events.status(Status::Connected {
            host: host.to_string(),
            port,
        });
        self.events.message("Connected to server!");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let receiver = tokio::spawn(receive_loop(
            ReceiveContext {
                dialect: self.dialect,
                events: self.events.clone(),
                inner: Arc::clone(&self.inner),
                generation: inner.generation,
            },
            reader,
            shutdown_rx,
        ));

        inner.state = ClientState::Connected;
        inner.nickname = Some(nickname);
        inner.link = Some(Link {
            writer,
            shutdown,
            receiver,
        });

        Ok(())
    }

    async fn open(
        &self,
        host: &str,
        port: u16,
        nickname: &str,
    ) -> Result<(FrameReader, FrameWriter), ConnectError> {
        let addr = format!("{host}:{port}");
        let after = self.config.connect_timeout();

        let stream = match tokio::time::timeout(after, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ConnectError::Io { addr, source }),
            Err(_) => return Err(ConnectError::Timeout { addr, after }),
        };

        let (reader, writer) = connection::split(stream, self.config.read_buffer_size);
        if self.dialect == Dialect::Chat {
            writer
                .send(&message::registration(nickname))
                .await
                .map_err(|source| ConnectError::Io { addr, source })?;
        }

        Ok((reader, writer))
    }

    /// Send one frame
    ///
    /// On success the text is reported back as a local line (`You: <text>`
    /// or `echo0: <text>`). A failed write disconnects the client before the
    /// error is returned.
    pub async fn send(&self, text: &str) -> Result<(), SendError> {
        let writer = {
            let inner = self.inner.lock().await;
            match (&inner.state, &inner.link) {
                (ClientState::Connected, Some(link)) => link.writer.clone(),
                _ => return Err(SendError::NotConnected),
            }
        };

        if let Err(e) = writer.send(text).await {
            warn!("Send failed: {}", e);
            self.events.error(format!("Send failed: {e}"));
            self.disconnect().await;
            return Err(SendError::Io(e));
        }

        debug!("Sent: {}", text);
        let shown = match self.dialect {
            Dialect::Chat => message::sent_chat_line(text),
            Dialect::Echo => message::sent_echo_line(text),
        };
        self.events.message(shown);
        Ok(())
    }

    /// Close the connection
    ///
    /// The echo dialect first sends `close` and waits up to `close_timeout`
    /// for the server's summary. Calling it while disconnected does nothing.
    pub async fn disconnect(&self) {
        let link = {
            let mut inner = self.inner.lock().await;
            if inner.state != ClientState::Connected {
                return;
            }
            inner.state = ClientState::Disconnected;
            inner.nickname = None;
            inner.link.take()
        };

        let Some(Link {
            writer,
            shutdown,
            receiver,
        }) = link
        else {
            return;
        };

        if self.dialect == Dialect::Echo {
            if let Err(e) = writer.send(CLOSE_SENTINEL).await {
                debug!("Could not send close sentinel: {}", e);
            }
        }

        let _ = shutdown.send(true);
        let reader = match receiver.await {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Receive task ended abnormally: {}", e);
                None
            }
        };

        if let (Dialect::Echo, Some(mut reader)) = (self.dialect, reader) {
            match reader.read_frame_timeout(self.config.close_timeout()).await {
                Ok(ReadOutcome::Frame(summary)) => self.events.message(summary),
                Ok(ReadOutcome::Idle) | Ok(ReadOutcome::Closed) => {}
                Err(e) => debug!("No summary from server: {}", e),
            }
        }

        writer.close().await;

        info!("Disconnected");
        self.events.status(Status::Disconnected);
    }
}

struct ReceiveContext {
    dialect: Dialect,
    events: EventSender,
    inner: Arc<Mutex<ClientInner>>,
    generation: u64,
}

/// Deliver incoming frames until the peer goes away or `disconnect` asks.
///
/// Hands the reader back when stopped by `disconnect`.
async fn receive_loop(
    ctx: ReceiveContext,
    mut reader: FrameReader,
    mut shutdown: watch::Receiver<bool>,
) -> Option<FrameReader> {
    let failure = loop {
        tokio::select! {
            _ = shutdown.changed() => return Some(reader),
            frame = reader.read_frame() => match frame {
                Ok(Some(frame)) => {
                    // `send` already reported the text as a local line.
                    if ctx.dialect == Dialect::Echo && message::is_echo_reply(&frame) {
                        debug!("Suppressed echo: {}", frame);
                        continue;
                    }
                    ctx.events.message(frame);
                }
                Ok(None) => break None,
                Err(e) => break Some(e),
            },
        }
    };

    let mut inner = ctx.inner.lock().await;
    if inner.generation != ctx.generation || inner.state != ClientState::Connected {
        return None;
    }

    inner.state = ClientState::Disconnected;
    inner.nickname = None;
    if let Some(link) = inner.link.take() {
        link.writer.close().await;
    }

    match failure {
        Some(e) => {
            warn!("Connection lost: {}", e);
            ctx.events.error(format!("Connection lost: {e}"));
        }
        None => info!("Server closed the connection"),
    }
    ctx.events.status(Status::Disconnected);

    None
}
