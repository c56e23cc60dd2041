//! Basic type definitions for the hub
//!
//! Provides small value types shared by the server and the client:
//! - `SessionId`: process-unique, monotonically increasing session number
//! - `Dialect`: which protocol variant a hub or client speaks
//! - `ServerState` / `ClientState`: lifecycle states

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(0);

/// Unique session identifier (newtype pattern)
///
/// Ids come from a process-wide counter, so they are never reused while the
/// process runs, even across hub restarts. Ordering follows accept order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Allocate the next session id
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Client{}", self.0)
    }
}

/// Protocol variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Dialect {
    /// Relay every frame to all other sessions, tagged with the nickname
    Chat,
    /// Answer every frame to its sender with a counted echo
    Echo,
}

impl Dialect {
    /// Lowest port a hub of this dialect may listen on.
    ///
    /// The echo hub stays out of the privileged range.
    pub fn min_port(self) -> u16 {
        match self {
            Dialect::Chat => 1,
            Dialect::Echo => 1024,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Chat => f.write_str("chat"),
            Dialect::Echo => f.write_str("echo"),
        }
    }
}

/// Hub lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Listening,
}

/// Client lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}
