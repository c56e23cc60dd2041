//! Event channel shared by the hub and the client
//!
//! Callers drain an `EventReceiver` to learn what happened: log text,
//! failures and state transitions. The channel is unbounded so emitting
//! never blocks a network task, and a consumer may call back into
//! `Hub::stop` or `Client::disconnect` while handling an event.

use serde::Serialize;
use tokio::sync::mpsc;

/// Receiving end handed to the caller
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Something the caller may want to display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Descriptive log text or a received frame
    Message { text: String },
    /// Failure description
    Error { text: String },
    /// Lifecycle transition
    Status { status: Status },
}

/// Lifecycle transitions reported through `Event::Status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    Listening { port: u16 },
    Stopped,
    Connected { host: String, port: u16 },
    Disconnected,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Listening { port } => write!(f, "Server running on port {port}"),
            Status::Stopped => f.write_str("Server stopped"),
            Status::Connected { host, port } => write!(f, "Connected to {host}:{port}"),
            Status::Disconnected => f.write_str("Disconnected"),
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Message { text } => f.write_str(text),
            Event::Error { text } => write!(f, "ERROR: {text}"),
            Event::Status { status } => write!(f, "[{status}]"),
        }
    }
}

/// Sending end held by hubs, handlers and clients
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Create a connected sender/receiver pair
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(Event::Message { text: text.into() });
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(Event::Error { text: text.into() });
    }

    pub fn status(&self, status: Status) {
        self.emit(Event::Status { status });
    }

    // A dropped receiver means nobody is listening; that is not a failure.
    fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(
            Status::Listening { port: 6000 }.to_string(),
            "Server running on port 6000"
        );
        assert_eq!(
            Status::Connected {
                host: "localhost".into(),
                port: 5000
            }
            .to_string(),
            "Connected to localhost:5000"
        );
        assert_eq!(Status::Disconnected.to_string(), "Disconnected");
    }

    #[test]
    fn test_event_serialize() {
        let event = Event::Status {
            status: Status::Listening { port: 6000 },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"status\""));
        assert!(json.contains("\"state\":\"listening\""));
        assert!(json.contains("\"port\":6000"));
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped() {
        let (events, rx) = EventSender::channel();
        drop(rx);
        events.message("nobody hears this");
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (events, mut rx) = EventSender::channel();
        events.message("one");
        events.error("two");
        events.status(Status::Stopped);

        assert_eq!(rx.recv().await, Some(Event::Message { text: "one".into() }));
        assert_eq!(rx.recv().await, Some(Event::Error { text: "two".into() }));
        assert_eq!(
            rx.recv().await,
            Some(Event::Status {
                status: Status::Stopped
            })
        );
    }
}
