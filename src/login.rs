//! Login and logout on top of the session registry.
//!
//! Credential checks (passwords, passkeys) happen before [`SessionService::login`] is
//! called; this module only turns an already-verified user into a session and a bearer
//! token, and tears sessions down again.

use crate::clock::{Clock, SystemClock};
use crate::error::{LoginError, RegistryError};
use crate::gate::Identity;
use crate::session::{InvalidateTarget, SessionRegistry};
use crate::telemetry::{EventSink, NullSink, SecurityEvent};
use crate::token::TokenCodec;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// What a client receives after logging in.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginGrant {
    /// New session.
    pub session_id: Uuid,
    /// Sealed bearer token for the `Authorization` header.
    pub bearer: String,
    /// Session expiry at issue time.
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for LoginGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginGrant")
            .field("session_id", &self.session_id)
            .field("bearer", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Creates and revokes sessions.
#[derive(Clone)]
pub struct SessionService {
    registry: Arc<dyn SessionRegistry>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService").finish_non_exhaustive()
    }
}

impl SessionService {
    /// Service over `registry` using the wall clock.
    pub fn new(registry: Arc<dyn SessionRegistry>) -> Self {
        Self {
            registry,
            codec: TokenCodec::new(),
            clock: Arc::new(SystemClock),
            sink: Arc::new(NullSink),
        }
    }

    /// Use `clock` for session timestamps and token issue time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.codec = TokenCodec::with_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// Emit events into `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Open a session for an already-authenticated `user_id` on `client_token`.
    ///
    /// # Errors
    /// [`LoginError::Registry`] when the registry refuses the session,
    /// [`LoginError::Token`] when the bearer token cannot be issued.
    pub async fn login(&self, user_id: &str, client_token: &str) -> Result<LoginGrant, LoginError> {
        let session = self.registry.create(user_id, client_token, self.clock.now()).await?;
        let bearer = match self.codec.issue(&session) {
            Ok(b) => b,
            Err(e) => {
                self.abandon(session.id).await;
                return Err(e.into());
            }
        };
        tracing::info!(user_id, session_id = %session.id, "session created");
        self.sink.record(SecurityEvent::SessionCreated {
            user_id: user_id.to_string(),
        });
        Ok(LoginGrant {
            session_id: session.id,
            bearer,
            expires_at: session.expires_at,
        })
    }

    /// Revoke every session of the caller.
    pub async fn logout(&self, identity: &Identity) -> Result<usize, RegistryError> {
        self.revoke(InvalidateTarget::User(identity.user_id.clone())).await
    }

    /// Revoke only the session that authenticated the caller.
    pub async fn logout_session(&self, identity: &Identity) -> Result<usize, RegistryError> {
        self.revoke(InvalidateTarget::Session(identity.session_id)).await
    }

    /// Revoke a session no client can use. Returns whether the registry confirmed it.
    async fn abandon(&self, session_id: Uuid) -> bool {
        let target = InvalidateTarget::Session(session_id);
        match self.registry.invalidate(target, self.clock.now()).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "failed to revoke session after token issue failure"
                );
                false
            }
        }
    }

    async fn revoke(&self, target: InvalidateTarget) -> Result<usize, RegistryError> {
        let count = self.registry.invalidate(target, self.clock.now()).await?;
        tracing::info!(count, "logged out");
        self.sink.record(SecurityEvent::SessionsInvalidated { count });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InMemorySessionRegistry, Session, StaticUsers};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Registry whose every call fails, counting invalidation attempts.
    #[derive(Default)]
    struct DownRegistry {
        invalidations: AtomicUsize,
    }

    fn down() -> RegistryError {
        RegistryError::Unavailable("connection reset".into())
    }

    #[async_trait]
    impl SessionRegistry for DownRegistry {
        async fn create(
            &self,
            _user_id: &str,
            _client_token: &str,
            _now: DateTime<Utc>,
        ) -> Result<Session, RegistryError> {
            Err(down())
        }

        async fn find_active_by_client_token(
            &self,
            _client_token: &str,
            _now: DateTime<Utc>,
        ) -> Result<Session, RegistryError> {
            Err(down())
        }

        async fn touch(
            &self,
            _session_id: Uuid,
            _now: DateTime<Utc>,
            _extension: Duration,
        ) -> Result<Session, RegistryError> {
            Err(down())
        }

        async fn invalidate(
            &self,
            _target: InvalidateTarget,
            _now: DateTime<Utc>,
        ) -> Result<usize, RegistryError> {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
            Err(down())
        }
    }

    #[tokio::test]
    async fn abandon_reports_a_failed_cleanup() {
        let registry = Arc::new(DownRegistry::default());
        let service = SessionService::new(registry.clone());
        assert!(!service.abandon(Uuid::new_v4()).await);
        assert_eq!(registry.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandon_revokes_the_session() {
        let users = Arc::new(StaticUsers::new(["alice"]));
        let registry = Arc::new(InMemorySessionRegistry::new(users));
        let service = SessionService::new(registry.clone());
        let grant = service.login("alice", "c1").await.unwrap();

        assert!(service.abandon(grant.session_id).await);
        let now = Utc::now();
        assert_eq!(
            registry.find_active_by_client_token("c1", now).await,
            Err(RegistryError::NotFound)
        );
    }

    #[tokio::test]
    async fn login_surfaces_registry_outage() {
        let service = SessionService::new(Arc::new(DownRegistry::default()));
        let err = service.login("alice", "c1").await.unwrap_err();
        assert!(matches!(err, LoginError::Registry(RegistryError::Unavailable(_))));
    }
}
