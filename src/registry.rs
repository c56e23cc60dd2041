//! Active session set
//!
//! An arena of sessions keyed by id behind a single lock. Iteration follows
//! id order, which is accept order. Nothing here touches the network while
//! the lock is held: callers get cloned sessions and write after the guard
//! is gone.

use std::collections::BTreeMap;

use tokio::sync::Mutex;

use crate::session::{Session, SessionInfo};
use crate::types::SessionId;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<BTreeMap<SessionId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly accepted session
    pub async fn insert(&self, session: Session) {
        self.sessions.lock().await.insert(session.id, session);
    }

    /// Remove a session, returning it if it was still present
    pub async fn remove(&self, id: SessionId) -> Option<Session> {
        self.sessions.lock().await.remove(&id)
    }

    /// Update a session's nickname; false if the session is gone
    pub async fn set_nickname(&self, id: SessionId, nickname: &str) -> bool {
        match self.sessions.lock().await.get_mut(&id) {
            Some(session) => {
                session.nickname = nickname.to_string();
                true
            }
            None => false,
        }
    }

    /// Copy out every session except `except`
    pub async fn recipients(&self, except: Option<SessionId>) -> Vec<Session> {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|session| Some(session.id) != except)
            .cloned()
            .collect()
    }

    /// Empty the set, handing back what was in it
    pub async fn drain(&self) -> Vec<Session> {
        let mut sessions = self.sessions.lock().await;
        std::mem::take(&mut *sessions).into_values().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn infos(&self) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .await
            .values()
            .map(Session::info)
            .collect()
    }
}
