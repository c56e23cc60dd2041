//! Session struct definition
//!
//! Server-side state for one accepted connection, as kept in the registry.

use std::io;
use std::net::SocketAddr;

use crate::connection::FrameWriter;
use crate::message::DEFAULT_NICKNAME;
use crate::types::SessionId;

/// Accepted connection
///
/// The reading half lives in the session's handler task; the registry keeps
/// the writing half so broadcasts and `stop` can reach the peer.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Remote address
    pub peer: SocketAddr,
    /// Current nickname ("Anonymous" until registered)
    pub nickname: String,
    /// Hub → peer writer
    pub writer: FrameWriter,
}

impl Session {
    pub fn new(id: SessionId, peer: SocketAddr, writer: FrameWriter) -> Self {
        Self {
            id,
            peer,
            nickname: DEFAULT_NICKNAME.to_string(),
            writer,
        }
    }

    /// Send one frame to this session's peer
    pub async fn send(&self, frame: &str) -> io::Result<()> {
        self.writer.send(frame).await
    }

    /// Close the connection, ignoring errors
    pub async fn close(&self) {
        self.writer.close().await;
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            peer: self.peer,
            nickname: self.nickname.clone(),
        }
    }
}

/// Read-only view of a session handed to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub nickname: String,
}
