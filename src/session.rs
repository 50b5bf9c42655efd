//! Session records and the registry that owns them.
//!
//! A session binds a client-held token to a server-generated secret for one user.
//! Sessions are addressable by client token while live; they are soft-deleted at
//! logout and lapse at `expires_at`.

use crate::error::RegistryError;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::time::Duration;
use uuid::Uuid;

pub mod memory;

pub use memory::{InMemorySessionRegistry, StaticUsers};

/// Server token entropy in bytes.
pub const SERVER_TOKEN_BYTES: usize = 32;

/// Default lifetime of a new session (30 days).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// One login of one user from one client.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Registry-assigned identifier.
    pub id: Uuid,
    /// Owner.
    pub user_id: String,
    /// Opaque secret generated and held by the client.
    pub client_token: String,
    /// Opaque secret generated by the server. Never sent in the clear.
    pub server_token: String,
    /// The session is live while `now < expires_at`.
    pub expires_at: DateTime<Utc>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last refresh.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Live means not deleted and not expired at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none() && now < self.expires_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("client_token", &"<redacted>")
            .field("server_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("deleted_at", &self.deleted_at)
            .finish()
    }
}

/// How many live sessions one user may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    /// A new login revokes the user's other sessions.
    #[default]
    Single,
    /// Sessions accumulate until they expire or the user logs out.
    Unbounded,
}

/// Selector for [`SessionRegistry::invalidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidateTarget {
    /// Every live session of the user.
    User(String),
    /// One session.
    Session(Uuid),
}

/// Persistence seam for sessions.
///
/// Every operation is atomic per session; a lookup racing with expiry or deletion
/// resolves to [`RegistryError::NotFound`].
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Persist a new session for `user_id` with a fresh server token.
    ///
    /// Fails with [`RegistryError::Conflict`] if `client_token` is empty, the user is
    /// unknown, or the client token belongs to another user's live session. A live
    /// session of the same user on the same client token is revoked and replaced, which
    /// rotates the server token.
    async fn create(
        &self,
        user_id: &str,
        client_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, RegistryError>;

    /// Live session bound to `client_token`.
    async fn find_active_by_client_token(
        &self,
        client_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, RegistryError>;

    /// Set `expires_at = now + extension` and `updated_at = now`.
    ///
    /// The expiry is absolute, so repeating a touch does not extend further.
    async fn touch(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
        extension: Duration,
    ) -> Result<Session, RegistryError>;

    /// Soft-delete matching live sessions. Returns how many were affected.
    async fn invalidate(
        &self,
        target: InvalidateTarget,
        now: DateTime<Utc>,
    ) -> Result<usize, RegistryError>;
}

/// Answers whether a user id exists. Account lifecycle lives elsewhere.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// True when `user_id` names a known, enabled account.
    async fn user_exists(&self, user_id: &str) -> Result<bool, RegistryError>;
}

/// Fresh random server token, base64url without padding.
pub fn generate_server_token() -> String {
    let mut bytes = [0u8; SERVER_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn deadline(now: DateTime<Utc>, extension: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(extension)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
