//! Multi-client TCP Chat Hub Library
//!
//! A small in-memory relay built on tokio, speaking two plain-text
//! dialects over raw TCP.
//!
//! # Features
//! - Chat dialect: `NICK:<name>` registration, fan-out of every line to all
//!   other clients as `<name>: <text>`, departure notices
//! - Echo dialect: counted `Echo <n>: <text>` replies to the sender only,
//!   `close` sentinel with a summary frame, operator broadcasts
//! - Matching client with a receive task and a graceful disconnect
//! - Event channel reporting log text, errors and state changes
//!
//! # Architecture
//! - `Hub` owns the listener; one accept task spawns one handler task per
//!   connection
//! - Active sessions live in a `SessionRegistry` behind a single lock;
//!   broadcasts copy the recipient list out before writing
//! - Shutdown is a `watch` signal; `stop` joins every task it started
//!
//! # Example
//! ```ignore
//! use chat_hub::{Client, ClientConfig, Hub, HubConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (hub, _hub_events) = Hub::chat(HubConfig::default());
//!     hub.start(6000).await.unwrap();
//!
//!     let (client, mut events) = Client::chat(ClientConfig::default());
//!     client.connect("127.0.0.1", 6000, "alice").await.unwrap();
//!     client.send("hi").await.unwrap();
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{event}");
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
mod handler;
pub mod hub;
pub mod message;
pub mod registry;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use config::{ClientConfig, HubConfig};
pub use error::{BindError, ConfigError, ConnectError, SendError};
pub use event::{Event, EventReceiver, Status};
pub use hub::Hub;
pub use session::SessionInfo;
pub use types::{ClientState, Dialect, ServerState, SessionId};
