use sessiongate::prelude::*;
use std::sync::Arc;
use std::time::Duration;

/// Session TTL and refresh window used by the fixtures.
pub const TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Registry, gate and login service sharing one manual clock and one memory sink.
pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub users: StaticUsers,
    pub registry: Arc<InMemorySessionRegistry>,
    pub gate: AuthGate,
    pub sessions: SessionService,
    pub sink: MemorySink,
}

pub fn fixture(policy: SessionPolicy) -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let clock = Arc::new(ManualClock::default());
    let users = StaticUsers::new(["alice", "bob"]);
    let sink = MemorySink::new();
    let registry = Arc::new(
        InMemorySessionRegistry::new(Arc::new(users.clone())).with_ttl(TTL).with_policy(policy),
    );
    let gate = AuthGate::new(registry.clone())
        .with_clock(clock.clone())
        .with_refresh_window(TTL)
        .with_sink(Arc::new(sink.clone()));
    let sessions = SessionService::new(registry.clone())
        .with_clock(clock.clone())
        .with_sink(Arc::new(sink.clone()));
    Fixture {
        clock,
        users,
        registry,
        gate,
        sessions,
        sink,
    }
}

pub fn headers(client_token: Option<&str>, authorization: Option<&str>) -> http::HeaderMap {
    let mut h = http::HeaderMap::new();
    if let Some(c) = client_token {
        h.insert("x-client-token", c.parse().unwrap());
    }
    if let Some(a) = authorization {
        h.insert(http::header::AUTHORIZATION, a.parse().unwrap());
    }
    h
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
