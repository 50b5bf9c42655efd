//! Convenient re-exports for common sessiongate types.
pub use crate::{
    clock::{Clock, ManualClock, SystemClock},
    config::Config,
    error::{LimiterError, LoginError, RegistryError, Rejection, StoreError, TokenError},
    gate::{AuthGate, AuthLayer, Identity},
    login::{LoginGrant, SessionService},
    rate_limit::{
        CounterStore, Decision, DenyReason, FailurePolicy, GcraLimiter, InMemoryCounterStore,
        Quota, Rate, RateLimitLayer, RateLimiter, VaryBy,
    },
    session::{
        InMemorySessionRegistry, InvalidateTarget, Session, SessionPolicy, SessionRegistry,
        StaticUsers, UserDirectory,
    },
    telemetry::{EventSink, LogSink, MemorySink, NullSink, SecurityEvent},
    token::{binding_tag, BearerClaims, TokenCodec},
};
