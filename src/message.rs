//! Wire frame definitions
//!
//! Both dialects speak plain UTF-8 text with no delimiter: whatever one read
//! returns is one frame. This module owns every literal that appears on the
//! wire so the hub, the handlers and the client agree on them.

/// Prefix of the chat registration frame
pub const NICK_PREFIX: &str = "NICK:";

/// Echo dialect sentinel that ends a session
pub const CLOSE_SENTINEL: &str = "close";

/// Nickname used until a registration frame arrives
pub const DEFAULT_NICKNAME: &str = "Anonymous";

const ECHO_PREFIX: &str = "Echo ";

/// Client → Server frame in the chat dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatFrame<'a> {
    /// `NICK:<name>`: set the session nickname, never relayed
    Register { nickname: &'a str },
    /// Anything else: relayed to the other sessions
    Text(&'a str),
}

impl<'a> ChatFrame<'a> {
    /// Classify a received chat frame
    pub fn parse(frame: &'a str) -> Self {
        match frame.strip_prefix(NICK_PREFIX) {
            Some(nickname) => ChatFrame::Register { nickname },
            None => ChatFrame::Text(frame),
        }
    }
}

/// Client → Server frame in the echo dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoFrame<'a> {
    /// The `close` sentinel
    Close,
    /// Payload to be echoed
    Text(&'a str),
}

impl<'a> EchoFrame<'a> {
    /// Classify a received echo frame
    pub fn parse(frame: &'a str) -> Self {
        if frame == CLOSE_SENTINEL {
            EchoFrame::Close
        } else {
            EchoFrame::Text(frame)
        }
    }
}

/// Registration frame sent by a chat client right after connecting
pub fn registration(nickname: &str) -> String {
    format!("{NICK_PREFIX}{nickname}")
}

/// Relayed chat line: `<nickname>: <text>`
pub fn chat_line(nickname: &str, text: &str) -> String {
    format!("{nickname}: {text}")
}

/// Departure notice fanned out when a chat session ends
pub fn left_notice(nickname: &str) -> String {
    format!("{nickname} has left the chat.")
}

/// Counted echo reply: `Echo <n>: <text>`
pub fn echo_reply(count: u64, text: &str) -> String {
    format!("{ECHO_PREFIX}{count}: {text}")
}

/// Summary written to an echo client when its session ends
pub fn echo_summary(count: u64) -> String {
    format!("{count} pesan diterima.")
}

/// Local line a chat client shows for text it sent
pub fn sent_chat_line(text: &str) -> String {
    format!("You: {text}")
}

/// Local line an echo client shows for text it sent
pub fn sent_echo_line(text: &str) -> String {
    format!("echo0: {text}")
}

/// Whether a frame looks like an echo of the client's own message.
///
/// Operator broadcasts share the reply channel with echoes and carry no
/// framing of their own, so this is a pattern match on the literal prefix
/// and nothing more. A broadcast that happens to start with `Echo ` and
/// contains a colon is indistinguishable from an echo.
pub fn is_echo_reply(frame: &str) -> bool {
    frame.starts_with(ECHO_PREFIX) && frame.contains(':')
}

/// Resolve the nickname a client registers with
pub fn nickname_or_default(nickname: &str) -> &str {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        DEFAULT_NICKNAME
    } else {
        trimmed
    }
}
