//! Error types for the gate, the limiter and their stores.
use http::StatusCode;

/// Why the authentication gate refused a request.
///
/// The distinction exists for logs and telemetry only. Every variant maps to the
/// same `401 Unauthorized` response so callers cannot enumerate sessions.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Client token header absent or empty.
    #[error("missing credential")]
    MissingCredential,
    /// Authorization header absent or not `Bearer <token>`.
    #[error("malformed authorization header")]
    MalformedHeader,
    /// No live session for the presented client token.
    #[error("no active session")]
    NoActiveSession,
    /// Bearer token failed to open, verify or match the session.
    #[error("invalid token")]
    InvalidToken,
    /// Session disappeared between lookup and refresh.
    #[error("session revoked")]
    SessionRevoked,
}

impl Rejection {
    /// Status code returned to the client. Always `401`.
    pub fn status(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    /// Stable label for logs and telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::MalformedHeader => "malformed_header",
            Self::NoActiveSession => "no_active_session",
            Self::InvalidToken => "invalid_token",
            Self::SessionRevoked => "session_revoked",
        }
    }
}

/// Errors surfaced by a [`CounterStore`](crate::rate_limit::store::CounterStore).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// Backend could not be reached.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced by the GCRA limiter.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LimiterError {
    /// The counter store failed and the limiter has no policy-level answer.
    ///
    /// [`GcraLimiter`](crate::rate_limit::GcraLimiter) never returns this; it folds store
    /// failures into a [`Decision`](crate::rate_limit::Decision) per its failure policy.
    /// Other [`RateLimiter`](crate::rate_limit::RateLimiter) implementations may surface
    /// it, and the middleware answers `503` for it.
    #[error("rate limit store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    /// Quota parameters cannot produce a positive emission interval.
    #[error("invalid quota: {0}")]
    InvalidQuota(String),
}

/// Errors produced by a [`SessionRegistry`](crate::session::SessionRegistry).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// The session cannot be created as requested.
    #[error("conflict: {0}")]
    Conflict(String),
    /// No live session matches.
    #[error("session not found")]
    NotFound,
    /// Backend could not be reached.
    #[error("session registry unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced by the [`TokenCodec`](crate::token::TokenCodec).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TokenError {
    /// Any parse, decryption, signature, audience or expiry failure.
    #[error("invalid bearer token")]
    Invalid,
    /// The token could not be produced.
    #[error("failed to issue bearer token: {0}")]
    Issue(String),
}

/// Errors returned by the login flow.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoginError {
    /// Session could not be created.
    #[error("login: {0}")]
    Registry(#[from] RegistryError),
    /// Bearer token could not be issued.
    #[error("login: {0}")]
    Token(#[from] TokenError),
}

/// Errors produced while loading configuration.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The TOML document did not parse.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value parsed but is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_rejection_is_unauthorized() {
        for r in [
            Rejection::MissingCredential,
            Rejection::MalformedHeader,
            Rejection::NoActiveSession,
            Rejection::InvalidToken,
            Rejection::SessionRevoked,
        ] {
            assert_eq!(r.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn store_error_converts_into_limiter_error() {
        let err: LimiterError = StoreError::Unavailable("redis down".into()).into();
        assert!(err.to_string().contains("redis down"));
    }

    #[test]
    fn token_error_display_is_opaque() {
        assert_eq!(TokenError::Invalid.to_string(), "invalid bearer token");
    }
}
