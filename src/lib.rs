#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # sessiongate
//!
//! Session-bound bearer authentication and GCRA rate limiting for tower services.
//!
//! ## Features
//!
//! - **GCRA rate limiting** over a pluggable compare-and-swap counter store
//! - **TTL-enforcing in-memory store** with lazy eviction and a background sweeper
//! - **Session registry** binding a client-held token to a server-generated secret
//! - **Sealed bearer tokens** (HS256 JWS inside ChaCha20-Poly1305) proving both secrets
//! - **Tower middleware** for admission (`429`) and authentication (`401`)
//!
//! ## Quick Start
//!
//! ```rust
//! use sessiongate::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let users = Arc::new(StaticUsers::new(["alice"]));
//!     let registry: Arc<dyn SessionRegistry> = Arc::new(InMemorySessionRegistry::new(users));
//!
//!     let sessions = SessionService::new(registry.clone());
//!     let grant = sessions.login("alice", "client-secret").await.unwrap();
//!
//!     let mut headers = http::HeaderMap::new();
//!     headers.insert("x-client-token", "client-secret".parse().unwrap());
//!     headers.insert("authorization", format!("Bearer {}", grant.bearer).parse().unwrap());
//!
//!     let gate = AuthGate::new(registry);
//!     let identity = gate.authenticate(&headers).await.unwrap();
//!     assert_eq!(identity.user_id, "alice");
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod login;
pub mod prelude;
pub mod rate_limit;
pub mod session;
pub mod telemetry;
pub mod token;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{
    ConfigError, LimiterError, LoginError, RegistryError, Rejection, StoreError, TokenError,
};
pub use gate::{AuthGate, AuthLayer, Identity};
pub use login::{LoginGrant, SessionService};
pub use rate_limit::{
    Decision, FailurePolicy, GcraLimiter, InMemoryCounterStore, Quota, Rate, RateLimitLayer,
    RateLimiter, VaryBy,
};
pub use session::{InMemorySessionRegistry, Session, SessionPolicy, SessionRegistry};
pub use token::{binding_tag, BearerClaims, TokenCodec};
