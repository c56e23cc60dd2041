//! Hub implementation
//!
//! The hub owns the listening socket and the set of active sessions. An
//! accept task runs while the hub is listening and spawns one handler task
//! per connection; `stop` signals the accept task, which aborts and joins
//! every handler before returning.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::HubConfig;
use crate::connection;
use crate::error::BindError;
use crate::event::{EventReceiver, EventSender, Status};
use crate::handler::handle_session;
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionInfo};
use crate::types::{Dialect, ServerState, SessionId};

/// State shared between the hub, its accept task and its handlers
#[derive(Debug)]
pub(crate) struct HubShared {
    pub(crate) dialect: Dialect,
    pub(crate) registry: SessionRegistry,
    pub(crate) events: EventSender,
}

impl HubShared {
    /// Send `message` to every session except `except`.
    ///
    /// A recipient whose send fails is dropped from the set and closed; the
    /// remaining recipients are still served. Returns successful deliveries.
    pub(crate) async fn broadcast_except(&self, except: Option<SessionId>, message: &str) -> usize {
        let recipients = self.registry.recipients(except).await;
        let mut delivered = 0;

        for session in recipients {
            match session.send(message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Broadcast to {} failed: {}", session.id, e);
                    self.remove_session(session.id).await;
                }
            }
        }

        delivered
    }

    /// Drop a session from the set and close it.
    ///
    /// Only the first caller for a given id sees `Some`; later calls are
    /// no-ops, so a handler and a failed broadcast can race safely. The echo
    /// handler reports its own end with the message total instead of the
    /// active count.
    pub(crate) async fn remove_session(&self, id: SessionId) -> Option<Session> {
        let session = self.registry.remove(id).await?;
        session.close().await;

        let remaining = self.registry.len().await;
        info!("{} removed, {} active", id, remaining);
        if self.dialect == Dialect::Chat {
            self.events.message(format!(
                "Client disconnected. Active connections: {remaining}"
            ));
        }

        Some(session)
    }
}

/// Handles owned while the hub is listening
struct Running {
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Chat or echo hub
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Hub {
    shared: Arc<HubShared>,
    config: HubConfig,
    running: Mutex<Option<Running>>,
}

impl Hub {
    /// Create a stopped hub and the receiver for its events
    pub fn new(dialect: Dialect, config: HubConfig) -> (Self, EventReceiver) {
        let (events, rx) = EventSender::channel();
        let hub = Self {
            shared: Arc::new(HubShared {
                dialect,
                registry: SessionRegistry::new(),
                events,
            }),
            config,
            running: Mutex::new(None),
        };
        (hub, rx)
    }

    /// Hub relaying each frame to every other session
    pub fn chat(config: HubConfig) -> (Self, EventReceiver) {
        Self::new(Dialect::Chat, config)
    }

    /// Hub echoing each frame back to its sender
    pub fn echo(config: HubConfig) -> (Self, EventReceiver) {
        Self::new(Dialect::Echo, config)
    }

    /// Bind `bind_host:port` and start accepting connections
    ///
    /// Returns the bound address. On failure the hub stays stopped and the
    /// session set is left alone.
    pub async fn start(&self, port: u16) -> Result<SocketAddr, BindError> {
        let min = self.shared.dialect.min_port();
        if port < min {
            return Err(BindError::InvalidPort { port, min });
        }

        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(BindError::AlreadyListening);
        }

        let events = &self.shared.events;
        events.message("Opening port...");

        let addr = SocketAddr::new(self.config.bind_host, port);
        let listener = match bind_listener(addr, self.config.backlog) {
            Ok(listener) => listener,
            Err(source) => {
                error!("Failed to bind {}: {}", addr, source);
                events.error(format!("Unable to attach to port: {source}"));
                return Err(BindError::Io { addr, source });
            }
        };
        let local_addr = listener
            .local_addr()
            .map_err(|source| BindError::Io { addr, source })?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.shared),
            shutdown_rx,
            self.config.read_buffer_size,
        ));

        *running = Some(Running {
            shutdown,
            accept_task,
            local_addr,
        });

        info!("{} hub listening on {}", self.shared.dialect, local_addr);
        events.status(Status::Listening {
            port: local_addr.port(),
        });
        events.message(format!("Server started on port {}", local_addr.port()));

        Ok(local_addr)
    }

    /// Stop listening and close every session
    ///
    /// Calling it on a stopped hub does nothing. Once it returns, no handler
    /// is left running and no further event mentions a closed connection.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(Running {
            shutdown,
            accept_task,
            local_addr,
        }) = running.take()
        else {
            return;
        };

        let _ = shutdown.send(true);
        if let Err(e) = accept_task.await {
            warn!("Accept task for {} ended abnormally: {}", local_addr, e);
        }

        for session in self.shared.registry.drain().await {
            session.close().await;
        }

        info!("{} hub on {} stopped", self.shared.dialect, local_addr);
        self.shared.events.status(Status::Stopped);
        self.shared.events.message("Server stopped");
    }

    /// Send `message` to every session except `sender` (`None`: everyone)
    pub async fn broadcast_except(&self, sender: Option<SessionId>, message: &str) -> usize {
        self.shared.broadcast_except(sender, message).await
    }

    /// Operator push to every connected session
    ///
    /// In the echo dialect these frames look exactly like payload; clients
    /// cannot tell them apart from anything else that lacks the echo prefix.
    pub async fn broadcast(&self, message: &str) -> usize {
        let message = message.trim();
        if message.is_empty() {
            return 0;
        }

        if self.state().await == ServerState::Stopped || self.shared.registry.is_empty().await {
            self.shared
                .events
                .message("No clients connected to receive the message");
            return 0;
        }

        self.shared.events.message(format!("Server sent: {message}"));
        self.shared.broadcast_except(None, message).await
    }

    pub async fn state(&self) -> ServerState {
        if self.running.lock().await.is_some() {
            ServerState::Listening
        } else {
            ServerState::Stopped
        }
    }

    /// Bound address while listening
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    pub async fn session_count(&self) -> usize {
        self.shared.registry.len().await
    }

    /// Active sessions in accept order
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.shared.registry.infos().await
    }
}

fn bind_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<HubShared>,
    mut shutdown: watch::Receiver<bool>,
    read_buffer_size: usize,
) {
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            // A dropped sender means the hub itself is gone.
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let id = SessionId::next();
                    let (reader, writer) = connection::split(stream, read_buffer_size);
                    let session = Session::new(id, peer, writer);
                    shared.registry.insert(session.clone()).await;

                    info!("{} connected from {}", id, peer);
                    shared.events.message(format!("New connection from {peer}"));

                    handlers.spawn(handle_session(
                        Arc::clone(&shared),
                        session,
                        reader,
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    shared.events.error(format!("Accept error: {e}"));
                }
            },
            Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = finished {
                    warn!("Session handler failed: {}", e);
                }
            }
        }
    }

    debug!("Accept loop stopping, aborting {} handlers", handlers.len());
    handlers.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::event::Event;

    fn local_config() -> HubConfig {
        HubConfig {
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..HubConfig::default()
        }
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    async fn wait_for_sessions(hub: &Hub, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while hub.session_count().await != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session count never reached");
    }

    async fn read_text(stream: &mut TcpStream) -> String {
        let mut buf = [0u8; 1024];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("read timed out")
            .unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    fn drain(rx: &mut EventReceiver) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn messages(events: Vec<Event>) -> Vec<String> {
        events
            .into_iter()
            .filter_map(|e| match e {
                Event::Message { text } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Accepted session plus the peer's end of its socket
    async fn connected_session() -> (Session, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (stream, addr) = listener.accept().await.unwrap();
        let (_reader, writer) = connection::split(stream, 1024);
        (Session::new(SessionId::next(), addr, writer), peer)
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (hub, mut rx) = Hub::chat(local_config());
        assert_eq!(hub.state().await, ServerState::Stopped);

        let addr = hub.start(free_port()).await.unwrap();
        assert_eq!(hub.state().await, ServerState::Listening);
        assert_eq!(hub.local_addr().await, Some(addr));

        hub.stop().await;
        assert_eq!(hub.state().await, ServerState::Stopped);
        assert_eq!(hub.local_addr().await, None);

        let events = drain(&mut rx);
        assert!(events.contains(&Event::Status {
            status: Status::Listening { port: addr.port() }
        }));
        assert!(events.contains(&Event::Status {
            status: Status::Stopped
        }));
    }

    #[tokio::test]
    async fn test_stop_twice_emits_once() {
        let (hub, mut rx) = Hub::echo(local_config());
        hub.start(free_port()).await.unwrap();

        hub.stop().await;
        hub.stop().await;

        let stopped = drain(&mut rx)
            .into_iter()
            .filter(|e| {
                *e == Event::Status {
                    status: Status::Stopped,
                }
            })
            .count();
        assert_eq!(stopped, 1);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let (hub, mut rx) = Hub::chat(local_config());
        hub.stop().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let (hub, _rx) = Hub::chat(local_config());
        hub.start(free_port()).await.unwrap();

        let result = hub.start(free_port()).await;
        assert!(matches!(result, Err(BindError::AlreadyListening)));

        hub.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_ports() {
        let (chat, _rx) = Hub::chat(local_config());
        assert!(matches!(
            chat.start(0).await,
            Err(BindError::InvalidPort { port: 0, min: 1 })
        ));

        let (echo, _rx) = Hub::echo(local_config());
        assert!(matches!(
            echo.start(80).await,
            Err(BindError::InvalidPort { port: 80, min: 1024 })
        ));
        assert_eq!(echo.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_port_in_use() {
        let (first, _rx1) = Hub::chat(local_config());
        let addr = first.start(free_port()).await.unwrap();

        let mut peer = TcpStream::connect(addr).await.unwrap();
        peer.write_all(b"NICK:alice").await.unwrap();
        wait_for_sessions(&first, 1).await;

        let (second, mut rx2) = Hub::chat(local_config());
        let result = second.start(addr.port()).await;
        assert!(matches!(result, Err(BindError::Io { .. })));
        assert_eq!(second.state().await, ServerState::Stopped);
        assert!(drain(&mut rx2)
            .iter()
            .any(|e| matches!(e, Event::Error { .. })));

        assert_eq!(first.session_count().await, 1);
        first.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_sessions() {
        let (hub, _rx) = Hub::echo(local_config());
        let addr = hub.start(free_port()).await.unwrap();

        let mut peer = TcpStream::connect(addr).await.unwrap();
        wait_for_sessions(&hub, 1).await;

        hub.stop().await;
        assert_eq!(hub.session_count().await, 0);

        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(2), peer.read(&mut buf))
            .await
            .expect("peer was not closed")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (hub, _rx) = Hub::chat(local_config());
        let port = free_port();

        hub.start(port).await.unwrap();
        hub.stop().await;
        hub.start(port).await.unwrap();
        assert_eq!(hub.state().await, ServerState::Listening);
        hub.stop().await;
    }

    #[tokio::test]
    async fn test_session_removed_on_disconnect() {
        let (hub, _rx) = Hub::chat(local_config());
        let addr = hub.start(free_port()).await.unwrap();

        let peer = TcpStream::connect(addr).await.unwrap();
        wait_for_sessions(&hub, 1).await;

        drop(peer);
        wait_for_sessions(&hub, 0).await;

        hub.stop().await;
    }

    #[tokio::test]
    async fn test_operator_broadcast_reaches_everyone() {
        let (hub, _rx) = Hub::echo(local_config());
        let addr = hub.start(free_port()).await.unwrap();

        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();
        wait_for_sessions(&hub, 2).await;

        assert_eq!(hub.broadcast("maintenance at noon").await, 2);
        assert_eq!(read_text(&mut a).await, "maintenance at noon");
        assert_eq!(read_text(&mut b).await, "maintenance at noon");

        hub.stop().await;
    }

    #[tokio::test]
    async fn test_operator_broadcast_without_clients() {
        let (hub, mut rx) = Hub::echo(local_config());
        hub.start(free_port()).await.unwrap();
        drain(&mut rx);

        assert_eq!(hub.broadcast("anyone?").await, 0);
        assert_eq!(hub.broadcast("   ").await, 0);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![Event::Message {
                text: "No clients connected to receive the message".into()
            }]
        );

        hub.stop().await;
    }

    #[tokio::test]
    async fn test_broadcast_except_skips_sender() {
        let (hub, _rx) = Hub::chat(local_config());
        let addr = hub.start(free_port()).await.unwrap();

        let mut a = TcpStream::connect(addr).await.unwrap();
        wait_for_sessions(&hub, 1).await;
        let mut b = TcpStream::connect(addr).await.unwrap();
        wait_for_sessions(&hub, 2).await;

        let sessions = hub.sessions().await;
        let first = sessions[0].id;

        assert_eq!(hub.broadcast_except(Some(first), "ping").await, 1);
        assert_eq!(read_text(&mut b).await, "ping");

        let mut buf = [0u8; 16];
        let silent = tokio::time::timeout(Duration::from_millis(200), a.read(&mut buf)).await;
        assert!(silent.is_err());

        hub.stop().await;
    }

    #[tokio::test]
    async fn test_stop_with_stalled_peer() {
        let (hub, _rx) = Hub::echo(local_config());
        let hub = Arc::new(hub);
        let addr = hub.start(free_port()).await.unwrap();

        // Never reads, so a large frame fills both socket buffers.
        let _peer = TcpStream::connect(addr).await.unwrap();
        wait_for_sessions(&hub, 1).await;

        let broadcast = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.broadcast(&"x".repeat(64 * 1024 * 1024)).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;

        tokio::time::timeout(Duration::from_secs(5), hub.stop())
            .await
            .expect("stop waited for a stalled broadcast");
        assert_eq!(hub.state().await, ServerState::Stopped);
        assert_eq!(hub.session_count().await, 0);

        let delivered = tokio::time::timeout(Duration::from_secs(5), broadcast)
            .await
            .expect("broadcast never returned")
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_failed_recipient_is_removed_once() {
        let (events, mut rx) = EventSender::channel();
        let shared = HubShared {
            dialect: Dialect::Chat,
            registry: SessionRegistry::new(),
            events,
        };

        let (live, mut live_peer) = connected_session().await;
        let (dead, _dead_peer) = connected_session().await;
        shared.registry.insert(live).await;
        shared.registry.insert(dead.clone()).await;
        // Still registered, but every write to it now fails.
        dead.close().await;

        assert_eq!(shared.broadcast_except(None, "first").await, 1);
        assert_eq!(shared.registry.len().await, 1);
        assert_eq!(shared.broadcast_except(None, "second").await, 1);
        assert_eq!(shared.registry.len().await, 1);

        let mut buf = [0u8; 11];
        tokio::time::timeout(Duration::from_secs(2), live_peer.read_exact(&mut buf))
            .await
            .expect("live peer missed a broadcast")
            .unwrap();
        assert_eq!(&buf, b"firstsecond");

        let removals: Vec<String> = messages(drain(&mut rx))
            .into_iter()
            .filter(|text| text.starts_with("Client disconnected."))
            .collect();
        assert_eq!(removals, vec!["Client disconnected. Active connections: 1"]);
    }

    #[tokio::test]
    async fn test_echo_end_reports_total_only() {
        let (hub, mut rx) = Hub::echo(local_config());
        let addr = hub.start(free_port()).await.unwrap();

        let mut peer = TcpStream::connect(addr).await.unwrap();
        wait_for_sessions(&hub, 1).await;
        let id = hub.sessions().await[0].id;

        peer.write_all(b"hello").await.unwrap();
        assert_eq!(read_text(&mut peer).await, "Echo 1: hello");
        peer.write_all(b"close").await.unwrap();
        assert_eq!(read_text(&mut peer).await, "1 pesan diterima.");
        wait_for_sessions(&hub, 0).await;

        let texts = messages(drain(&mut rx));
        assert!(texts.contains(&format!("{id} disconnected. Total messages: 1")));
        assert!(!texts.iter().any(|t| t.starts_with("Client disconnected.")));

        hub.stop().await;
    }
}
