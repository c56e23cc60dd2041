//! Per-connection handling loops
//!
//! One task per accepted connection reads frames until the peer goes away
//! and applies the hub's dialect to each of them. The task is aborted by the
//! accept loop when the hub stops, so nothing here watches for shutdown
//! except the chat departure notice.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::connection::FrameReader;
use crate::hub::HubShared;
use crate::message::{self, ChatFrame, EchoFrame, DEFAULT_NICKNAME};
use crate::session::Session;
use crate::types::Dialect;

/// Drive one session to completion
pub(crate) async fn handle_session(
    shared: Arc<HubShared>,
    session: Session,
    mut reader: FrameReader,
    shutdown: watch::Receiver<bool>,
) {
    debug!("Handler started for {} ({})", session.id, session.peer);

    match shared.dialect {
        Dialect::Chat => handle_chat(&shared, &session, &mut reader, &shutdown).await,
        Dialect::Echo => handle_echo(&shared, &session, &mut reader).await,
    }

    debug!("Handler ended for {}", session.id);
}

/// Next frame from the peer, or `None` when the session should end
async fn next_frame(shared: &HubShared, session: &Session, reader: &mut FrameReader) -> Option<String> {
    match reader.read_frame().await {
        Ok(Some(frame)) => Some(frame),
        Ok(None) => {
            debug!("{} closed the connection", session.id);
            None
        }
        Err(e) => {
            warn!("Read error for {}: {}", session.id, e);
            shared.events.error(format!("Error handling client: {e}"));
            None
        }
    }
}

async fn handle_chat(
    shared: &HubShared,
    session: &Session,
    reader: &mut FrameReader,
    shutdown: &watch::Receiver<bool>,
) {
    let mut nickname = DEFAULT_NICKNAME.to_string();

    while let Some(frame) = next_frame(shared, session, reader).await {
        match ChatFrame::parse(&frame) {
            ChatFrame::Register { nickname: name } => {
                nickname = name.to_string();
                shared.registry.set_nickname(session.id, &nickname).await;
                info!("{} registered as '{}'", session.id, nickname);
                shared.events.message(format!("Client registered: {nickname}"));
            }
            ChatFrame::Text(text) => {
                let line = message::chat_line(&nickname, text);
                debug!("Relaying from {}: {}", session.id, line);
                shared.events.message(format!("Received: {line}"));
                shared.broadcast_except(Some(session.id), &line).await;
            }
        }
    }

    shared.remove_session(session.id).await;

    let listening = !*shutdown.borrow();
    if listening {
        shared
            .broadcast_except(None, &message::left_notice(&nickname))
            .await;
    }
}

async fn handle_echo(shared: &HubShared, session: &Session, reader: &mut FrameReader) {
    let mut received: u64 = 0;

    while let Some(frame) = next_frame(shared, session, reader).await {
        let text = match EchoFrame::parse(&frame) {
            EchoFrame::Close => {
                debug!("{} sent close", session.id);
                break;
            }
            EchoFrame::Text(text) => text,
        };

        received += 1;
        shared.events.message(format!(
            "Message from {} ({}): \"{}\"",
            session.id,
            session.peer.ip(),
            text
        ));

        if let Err(e) = session.send(&message::echo_reply(received, text)).await {
            warn!("Echo to {} failed: {}", session.id, e);
            shared.events.error(format!("Error handling client: {e}"));
            break;
        }
    }

    // The peer may already be gone.
    let _ = session.send(&message::echo_summary(received)).await;
    info!("{} disconnected after {} messages", session.id, received);
    shared.events.message(format!(
        "{} disconnected. Total messages: {received}",
        session.id
    ));

    shared.remove_session(session.id).await;
}
