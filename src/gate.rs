//! Authentication gate: request headers in, [`Identity`] or [`Rejection`] out.
//!
//! Steps, in order:
//!
//! 1. read the client token header (`MissingCredential`);
//! 2. find the live session for it (`NoActiveSession`);
//! 3. parse `Authorization: Bearer <token>` (`MalformedHeader`);
//! 4. verify the bearer token against the session secrets (`InvalidToken`);
//! 5. slide the session expiry forward (`SessionRevoked` if it vanished meanwhile).
//!
//! The expiry only moves after step 4 succeeds, so a stolen client token alone cannot
//! keep a session alive.

use crate::clock::{Clock, SystemClock};
use crate::error::{RegistryError, Rejection};
use crate::session::{SessionRegistry, DEFAULT_SESSION_TTL};
use crate::telemetry::{EventSink, NullSink, SecurityEvent};
use crate::token::TokenCodec;
use http::header::{HeaderMap, HeaderName, AUTHORIZATION};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub mod middleware;

pub use middleware::{AuthLayer, AuthService};

/// Default client token header.
pub const CLIENT_TOKEN_HEADER: &str = "x-client-token";

const BEARER_PREFIX: &str = "Bearer ";

/// The authenticated caller, as seen by downstream handlers.
///
/// Inserted into request extensions by [`AuthLayer`]. Carries no token material.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Authenticated user.
    pub user_id: String,
    /// Session that authenticated the request.
    pub session_id: Uuid,
}

/// Orchestrates the session registry and the token codec for one request at a time.
#[derive(Clone)]
pub struct AuthGate {
    registry: Arc<dyn SessionRegistry>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    refresh_window: Duration,
    client_header: HeaderName,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("refresh_window", &self.refresh_window)
            .field("client_header", &self.client_header)
            .finish_non_exhaustive()
    }
}

impl AuthGate {
    /// Gate over `registry` using the wall clock and default settings.
    pub fn new(registry: Arc<dyn SessionRegistry>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            registry,
            codec: TokenCodec::with_clock(clock.clone()),
            clock,
            refresh_window: DEFAULT_SESSION_TTL,
            client_header: HeaderName::from_static(CLIENT_TOKEN_HEADER),
            sink: Arc::new(NullSink),
        }
    }

    /// Use `clock` for lookups, refreshes and token expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.codec = TokenCodec::with_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// How far each successful authentication pushes the session expiry.
    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    /// Read the client token from `header` instead of `X-Client-Token`.
    pub fn with_client_header(mut self, header: HeaderName) -> Self {
        self.client_header = header;
        self
    }

    /// Emit events into `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Authenticate a request from its headers.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, Rejection> {
        match self.run(headers).await {
            Ok(identity) => {
                self.sink.record(SecurityEvent::AuthSucceeded {
                    user_id: identity.user_id.clone(),
                });
                Ok(identity)
            }
            Err(reason) => {
                tracing::info!(reason = reason.as_str(), "authentication rejected");
                self.sink.record(SecurityEvent::AuthRejected { reason });
                Err(reason)
            }
        }
    }

    async fn run(&self, headers: &HeaderMap) -> Result<Identity, Rejection> {
        let client_token = headers
            .get(&self.client_header)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(Rejection::MissingCredential)?;

        let session = match self
            .registry
            .find_active_by_client_token(client_token, self.clock.now())
            .await
        {
            Ok(s) => s,
            Err(RegistryError::Unavailable(cause)) => {
                tracing::warn!(cause = %cause, "session registry unavailable");
                return Err(Rejection::NoActiveSession);
            }
            Err(_) => return Err(Rejection::NoActiveSession),
        };

        let bearer = bearer_token(headers).ok_or(Rejection::MalformedHeader)?;

        self.codec
            .verify(bearer, &session.client_token, &session.server_token)
            .map_err(|_| Rejection::InvalidToken)?;

        self.registry
            .touch(session.id, self.clock.now(), self.refresh_window)
            .await
            .map_err(|_| Rejection::SessionRevoked)?;

        Ok(Identity {
            user_id: session.user_id,
            session_id: session.id,
        })
    }
}

/// Token after a literal `Bearer ` prefix, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?;
    if token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}
