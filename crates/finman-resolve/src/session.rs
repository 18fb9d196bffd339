//! Conversation sessions: identity binding and pending-resolution storage.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use finman_core::IdentityKey;
use tracing::debug;

use crate::error::ResolveError;
use crate::state::PendingResolution;

/// Opaque chat-side conversation handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Supplies the identity a conversation is authenticated as.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn identity(&self, conv: &ConversationId) -> Option<IdentityKey>;
}

/// Holds at most one pending resolution per conversation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn pending(&self, conv: &ConversationId) -> Result<Option<PendingResolution>, ResolveError>;
    async fn set_pending(
        &self,
        conv: &ConversationId,
        state: PendingResolution,
    ) -> Result<(), ResolveError>;
    async fn clear_pending(&self, conv: &ConversationId) -> Result<(), ResolveError>;
}

struct Session {
    identity: Option<IdentityKey>,
    pending: Option<PendingResolution>,
    expires_at: DateTime<Utc>,
}

/// In-process sessions with idle expiry.
///
/// Every access refreshes the session's deadline; an expired session is
/// dropped on the next access along with any pending resolution it held.
pub struct MemorySessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<ConversationId, Session>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<ConversationId, Session>>, ResolveError> {
        self.sessions
            .lock()
            .map_err(|_| ResolveError::Session("session map lock poisoned".into()))
    }

    /// Record that `conv` has authenticated as `identity`.
    pub fn bind_identity(&self, conv: &ConversationId, identity: IdentityKey) -> Result<(), ResolveError> {
        self.bind_identity_at(conv, identity, Utc::now())
    }

    pub fn bind_identity_at(
        &self,
        conv: &ConversationId,
        identity: IdentityKey,
        now: DateTime<Utc>,
    ) -> Result<(), ResolveError> {
        let mut sessions = self.sessions()?;
        let expires_at = now + self.ttl;
        let session = sessions.entry(conv.clone()).or_insert_with(|| Session {
            identity: None,
            pending: None,
            expires_at,
        });
        session.identity = Some(identity);
        session.expires_at = expires_at;
        Ok(())
    }

    /// Drop the session entirely (logout).
    pub fn end(&self, conv: &ConversationId) -> Result<(), ResolveError> {
        self.sessions()?.remove(conv);
        Ok(())
    }

    pub fn identity_at(&self, conv: &ConversationId, now: DateTime<Utc>) -> Option<IdentityKey> {
        let mut sessions = self.sessions().ok()?;
        self.live(&mut sessions, conv, now)
            .and_then(|s| s.identity.clone())
    }

    pub fn pending_at(
        &self,
        conv: &ConversationId,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingResolution>, ResolveError> {
        let mut sessions = self.sessions()?;
        Ok(self.live(&mut sessions, conv, now).and_then(|s| s.pending.clone()))
    }

    pub fn set_pending_at(
        &self,
        conv: &ConversationId,
        state: PendingResolution,
        now: DateTime<Utc>,
    ) -> Result<(), ResolveError> {
        let mut sessions = self.sessions()?;
        if self.live(&mut sessions, conv, now).is_none() {
            sessions.insert(
                conv.clone(),
                Session {
                    identity: None,
                    pending: None,
                    expires_at: now + self.ttl,
                },
            );
        }
        if let Some(session) = sessions.get_mut(conv) {
            session.pending = Some(state);
        }
        Ok(())
    }

    /// Remove every session idle past its deadline. Returns how many went.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<usize, ResolveError> {
        let mut sessions = self.sessions()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        let purged = before - sessions.len();
        if purged > 0 {
            debug!(purged, "purged expired sessions");
        }
        Ok(purged)
    }

    /// The live session for `conv`, refreshed; expired ones are removed.
    fn live<'a>(
        &self,
        sessions: &'a mut HashMap<ConversationId, Session>,
        conv: &ConversationId,
        now: DateTime<Utc>,
    ) -> Option<&'a mut Session> {
        if sessions.get(conv).is_some_and(|s| s.expires_at <= now) {
            debug!(conversation = %conv, "session expired");
            sessions.remove(conv);
            return None;
        }
        let session = sessions.get_mut(conv)?;
        session.expires_at = now + self.ttl;
        Some(session)
    }
}

#[async_trait]
impl IdentitySource for MemorySessionStore {
    async fn identity(&self, conv: &ConversationId) -> Option<IdentityKey> {
        self.identity_at(conv, Utc::now())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn pending(&self, conv: &ConversationId) -> Result<Option<PendingResolution>, ResolveError> {
        self.pending_at(conv, Utc::now())
    }

    async fn set_pending(
        &self,
        conv: &ConversationId,
        state: PendingResolution,
    ) -> Result<(), ResolveError> {
        self.set_pending_at(conv, state, Utc::now())
    }

    async fn clear_pending(&self, conv: &ConversationId) -> Result<(), ResolveError> {
        if let Some(session) = self.sessions()?.get_mut(conv) {
            session.pending = None;
        }
        Ok(())
    }
}
