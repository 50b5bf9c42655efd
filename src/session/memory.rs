//! In-memory session registry.

use super::{
    deadline, generate_server_token, InvalidateTarget, Session, SessionPolicy, SessionRegistry,
    UserDirectory, DEFAULT_SESSION_TTL,
};
use crate::error::RegistryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Fixed set of known user ids.
#[derive(Debug, Default, Clone)]
pub struct StaticUsers {
    users: Arc<DashSet<String>>,
}

impl StaticUsers {
    /// Directory containing `users`.
    pub fn new<I, U>(users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        let set = DashSet::new();
        for u in users {
            set.insert(u.into());
        }
        Self {
            users: Arc::new(set),
        }
    }

    /// Add a user.
    pub fn insert(&self, user_id: impl Into<String>) {
        self.users.insert(user_id.into());
    }

    /// Remove a user. Existing sessions are untouched.
    pub fn remove(&self, user_id: &str) {
        self.users.remove(user_id);
    }
}

#[async_trait]
impl UserDirectory for StaticUsers {
    async fn user_exists(&self, user_id: &str) -> Result<bool, RegistryError> {
        Ok(self.users.contains(user_id))
    }
}

/// Session registry kept in sharded concurrent maps.
///
/// Lock order is always user index, then client index, then sessions. No guard is held
/// across an `.await`. Logins of one user are serialized on that user's index entry;
/// logins of different users only meet on shared shards.
#[derive(Clone)]
pub struct InMemorySessionRegistry {
    sessions: Arc<DashMap<Uuid, Session>>,
    by_client: Arc<DashMap<String, Uuid>>,
    by_user: Arc<DashMap<String, Vec<Uuid>>>,
    users: Arc<dyn UserDirectory>,
    ttl: Duration,
    policy: SessionPolicy,
}

impl std::fmt::Debug for InMemorySessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("ttl", &self.ttl)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl InMemorySessionRegistry {
    /// Registry that validates owners against `users`.
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            by_client: Arc::new(DashMap::new()),
            by_user: Arc::new(DashMap::new()),
            users,
            ttl: DEFAULT_SESSION_TTL,
            policy: SessionPolicy::default(),
        }
    }

    /// Lifetime given to new sessions.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Concurrent-session policy applied at `create`.
    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of stored sessions, including dead ones not yet purged.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Physically drop sessions that are deleted or expired at `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.is_active(now));
        let sessions = &self.sessions;
        self.by_user.retain(|_, ids| {
            ids.retain(|id| sessions.contains_key(id));
            !ids.is_empty()
        });
        self.by_client.retain(|_, id| sessions.contains_key(id));
        before.saturating_sub(self.sessions.len())
    }

    fn soft_delete(&self, id: &Uuid, now: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut s) if s.is_active(now) => {
                s.deleted_at = Some(now);
                s.updated_at = now;
                true
            }
            _ => false,
        }
    }

    fn revoke_user(&self, user_id: &str, now: DateTime<Utc>) -> usize {
        match self.by_user.get(user_id) {
            Some(ids) => ids.iter().filter(|id| self.soft_delete(id, now)).count(),
            None => 0,
        }
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn create(
        &self,
        user_id: &str,
        client_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, RegistryError> {
        if client_token.is_empty() {
            return Err(RegistryError::Conflict("client token is empty".into()));
        }
        if !self.users.user_exists(user_id).await? {
            return Err(RegistryError::Conflict("unknown user".into()));
        }

        let session = Session {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            client_token: client_token.to_string(),
            server_token: generate_server_token(),
            expires_at: deadline(now, self.ttl),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        // Held until the new session is indexed.
        let mut owned = self.by_user.entry(user_id.to_string()).or_default();
        let slot = self.by_client.entry(client_token.to_string());
        if let Entry::Occupied(taken) = &slot {
            let holder = self
                .sessions
                .get(taken.get())
                .filter(|s| s.is_active(now))
                .map(|s| (s.id, s.user_id == user_id));
            match holder {
                Some((_, false)) => {
                    return Err(RegistryError::Conflict("client token already in use".into()));
                }
                // Same user on the same client: rotate the server token.
                Some((previous, true)) => {
                    self.soft_delete(&previous, now);
                    tracing::debug!(session_id = %previous, "session rotated");
                }
                None => {}
            }
        }

        if self.policy == SessionPolicy::Single {
            for id in owned.iter() {
                self.soft_delete(id, now);
            }
        }
        let sessions = &self.sessions;
        owned.retain(|id| sessions.get(id).map(|s| s.is_active(now)).unwrap_or(false));
        self.sessions.insert(session.id, session.clone());
        owned.push(session.id);
        slot.insert(session.id);
        Ok(session)
    }

    async fn find_active_by_client_token(
        &self,
        client_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, RegistryError> {
        let id = match self.by_client.get(client_token) {
            Some(id) => *id,
            None => return Err(RegistryError::NotFound),
        };
        match self.sessions.get(&id) {
            Some(s) if s.is_active(now) && s.client_token == client_token => Ok(s.clone()),
            _ => Err(RegistryError::NotFound),
        }
    }

    async fn touch(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
        extension: Duration,
    ) -> Result<Session, RegistryError> {
        match self.sessions.get_mut(&session_id) {
            Some(mut s) if s.is_active(now) => {
                s.expires_at = deadline(now, extension);
                s.updated_at = now;
                Ok(s.clone())
            }
            _ => Err(RegistryError::NotFound),
        }
    }

    async fn invalidate(
        &self,
        target: InvalidateTarget,
        now: DateTime<Utc>,
    ) -> Result<usize, RegistryError> {
        let count = match target {
            InvalidateTarget::User(user_id) => self.revoke_user(&user_id, now),
            InvalidateTarget::Session(id) => usize::from(self.soft_delete(&id, now)),
        };
        tracing::debug!(count, "sessions invalidated");
        Ok(count)
    }
}
