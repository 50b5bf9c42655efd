mod common;

use common::test_helpers::TTL;
use sessiongate::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn registry(policy: SessionPolicy) -> (InMemorySessionRegistry, Arc<ManualClock>) {
    let users = StaticUsers::new(["alice", "bob"]);
    let registry =
        InMemorySessionRegistry::new(Arc::new(users)).with_ttl(TTL).with_policy(policy);
    (registry, Arc::new(ManualClock::default()))
}

#[tokio::test]
async fn new_session_has_fresh_secrets_and_full_ttl() {
    let (r, clock) = registry(SessionPolicy::Single);
    let now = clock.now();
    let s = r.create("alice", "c1", now).await.unwrap();
    assert_eq!(s.user_id, "alice");
    assert_eq!(s.client_token, "c1");
    assert!(!s.server_token.is_empty());
    assert_eq!(s.expires_at, now + chrono::Duration::from_std(TTL).unwrap());
    assert_eq!(s.deleted_at, None);

    let other = r.create("bob", "c2", now).await.unwrap();
    assert_ne!(s.server_token, other.server_token);
    assert_ne!(s.id, other.id);
}

#[tokio::test]
async fn touch_sets_an_absolute_expiry() {
    let (r, clock) = registry(SessionPolicy::Single);
    let s = r.create("alice", "c1", clock.now()).await.unwrap();

    clock.advance(Duration::from_secs(10));
    let ext = Duration::from_secs(3600);
    let once = r.touch(s.id, clock.now(), ext).await.unwrap();
    let twice = r.touch(s.id, clock.now(), ext).await.unwrap();
    assert_eq!(once.expires_at, twice.expires_at);
    assert_eq!(once.expires_at, clock.now() + chrono::Duration::seconds(3600));
    assert_eq!(twice.updated_at, clock.now());
}

#[tokio::test]
async fn touch_can_shorten_as_well_as_extend() {
    let (r, clock) = registry(SessionPolicy::Single);
    let s = r.create("alice", "c1", clock.now()).await.unwrap();
    let t = r.touch(s.id, clock.now(), Duration::from_secs(1)).await.unwrap();
    assert!(t.expires_at < s.expires_at);

    clock.advance(Duration::from_secs(1));
    let err = r.find_active_by_client_token("c1", clock.now()).await.unwrap_err();
    assert_eq!(err, RegistryError::NotFound);
}

#[tokio::test]
async fn invalidate_user_ends_every_session_and_blocks_touch() {
    let (r, clock) = registry(SessionPolicy::Unbounded);
    let a = r.create("alice", "c1", clock.now()).await.unwrap();
    let b = r.create("alice", "c2", clock.now()).await.unwrap();
    let bob = r.create("bob", "c3", clock.now()).await.unwrap();

    let n = r.invalidate(InvalidateTarget::User("alice".into()), clock.now()).await.unwrap();
    assert_eq!(n, 2);

    for token in ["c1", "c2"] {
        let err = r.find_active_by_client_token(token, clock.now()).await.unwrap_err();
        assert_eq!(err, RegistryError::NotFound);
    }
    for id in [a.id, b.id] {
        let err = r.touch(id, clock.now(), TTL).await.unwrap_err();
        assert_eq!(err, RegistryError::NotFound);
    }
    assert_eq!(r.find_active_by_client_token("c3", clock.now()).await.unwrap().id, bob.id);

    // Already gone, nothing left to count.
    let n = r.invalidate(InvalidateTarget::User("alice".into()), clock.now()).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn invalidate_single_session_leaves_siblings() {
    let (r, clock) = registry(SessionPolicy::Unbounded);
    let a = r.create("alice", "c1", clock.now()).await.unwrap();
    let b = r.create("alice", "c2", clock.now()).await.unwrap();

    assert_eq!(r.invalidate(InvalidateTarget::Session(a.id), clock.now()).await.unwrap(), 1);
    assert!(r.find_active_by_client_token("c1", clock.now()).await.is_err());
    assert_eq!(r.find_active_by_client_token("c2", clock.now()).await.unwrap().id, b.id);
}

#[tokio::test]
async fn single_policy_revokes_previous_login() {
    let (r, clock) = registry(SessionPolicy::Single);
    r.create("alice", "laptop", clock.now()).await.unwrap();
    r.create("bob", "desk", clock.now()).await.unwrap();
    r.create("alice", "phone", clock.now()).await.unwrap();

    assert!(r.find_active_by_client_token("laptop", clock.now()).await.is_err());
    assert!(r.find_active_by_client_token("phone", clock.now()).await.is_ok());
    assert!(r.find_active_by_client_token("desk", clock.now()).await.is_ok());
}

#[tokio::test]
async fn unbounded_policy_keeps_concurrent_logins() {
    let (r, clock) = registry(SessionPolicy::Unbounded);
    r.create("alice", "laptop", clock.now()).await.unwrap();
    r.create("alice", "phone", clock.now()).await.unwrap();
    assert!(r.find_active_by_client_token("laptop", clock.now()).await.is_ok());
    assert!(r.find_active_by_client_token("phone", clock.now()).await.is_ok());
}

#[tokio::test]
async fn removed_user_cannot_log_in_again() {
    let users = StaticUsers::new(["carol"]);
    let r = InMemorySessionRegistry::new(Arc::new(users.clone()));
    let clock = ManualClock::default();
    r.create("carol", "c1", clock.now()).await.unwrap();
    users.remove("carol");
    assert!(matches!(
        r.create("carol", "c2", clock.now()).await,
        Err(RegistryError::Conflict(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_logins_leave_one_live_session_under_single_policy() {
    let (r, clock) = registry(SessionPolicy::Single);
    let r = Arc::new(r);
    let now = clock.now();

    for round in 0..200 {
        let tokens: Vec<String> = (0..16).map(|i| format!("c{round}-{i}")).collect();
        let mut handles = Vec::new();
        for token in tokens.clone() {
            let r = r.clone();
            handles.push(tokio::spawn(async move { r.create("alice", &token, now).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let mut live = 0;
        for token in &tokens {
            if r.find_active_by_client_token(token, now).await.is_ok() {
                live += 1;
            }
        }
        assert_eq!(live, 1, "round {round}");
    }
}

#[tokio::test]
async fn same_user_can_rotate_a_live_client_token() {
    let (r, clock) = registry(SessionPolicy::Single);
    let first = r.create("alice", "c1", clock.now()).await.unwrap();
    let second = r.create("alice", "c1", clock.now()).await.unwrap();
    assert_ne!(first.server_token, second.server_token);

    let live = r.find_active_by_client_token("c1", clock.now()).await.unwrap();
    assert_eq!(live.id, second.id);
    assert!(matches!(
        r.create("bob", "c1", clock.now()).await,
        Err(RegistryError::Conflict(_))
    ));
}
