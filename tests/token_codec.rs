use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration as ChronoDuration, Utc};
use sessiongate::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn session(client: &str, server: &str, clock: &ManualClock, ttl_secs: i64) -> Session {
    let now = clock.now();
    Session {
        id: Uuid::new_v4(),
        user_id: "alice".into(),
        client_token: client.into(),
        server_token: server.into(),
        expires_at: now + ChronoDuration::seconds(ttl_secs),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

fn codec() -> (TokenCodec, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    (TokenCodec::with_clock(clock.clone()), clock)
}

#[test]
fn round_trip_carries_the_binding_tag() {
    let (codec, clock) = codec();
    let s = session("client-a", "server-a", &clock, 3600);
    let token = codec.issue(&s).unwrap();

    let claims = codec.verify(&token, "client-a", "server-a").unwrap();
    assert_eq!(claims.aud, vec![binding_tag("client-a", "server-a").unwrap()]);
    assert_eq!(claims.exp, s.expires_at.timestamp());
    assert_eq!(claims.iat, clock.now().timestamp());
}

#[test]
fn tokens_are_not_deterministic() {
    let (codec, clock) = codec();
    let s = session("c", "s", &clock, 60);
    assert_ne!(codec.issue(&s).unwrap(), codec.issue(&s).unwrap());
}

#[test]
fn token_from_another_session_is_rejected() {
    let (codec, clock) = codec();
    let a = session("client-a", "server-a", &clock, 3600);
    let token = codec.issue(&a).unwrap();

    // Same client token, rotated server token.
    assert_eq!(codec.verify(&token, "client-a", "server-b"), Err(TokenError::Invalid));
    // Different client token: the seal does not open.
    assert_eq!(codec.verify(&token, "client-b", "server-a"), Err(TokenError::Invalid));
}

#[test]
fn expired_token_is_rejected_without_leeway() {
    let (codec, clock) = codec();
    let s = session("c", "s", &clock, 60);
    let token = codec.issue(&s).unwrap();

    clock.advance(Duration::from_secs(59));
    assert!(codec.verify(&token, "c", "s").is_ok());
    clock.advance(Duration::from_secs(1));
    assert_eq!(codec.verify(&token, "c", "s"), Err(TokenError::Invalid));
}

#[test]
fn tampered_token_is_rejected() {
    let (codec, clock) = codec();
    let s = session("c", "s", &clock, 3600);
    let token = codec.issue(&s).unwrap();

    let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
    let last = raw.len() - 1;
    raw[last] ^= 0x01;
    let flipped = URL_SAFE_NO_PAD.encode(&raw);
    assert_eq!(codec.verify(&flipped, "c", "s"), Err(TokenError::Invalid));

    let truncated = URL_SAFE_NO_PAD.encode(&raw[..12]);
    assert_eq!(codec.verify(&truncated, "c", "s"), Err(TokenError::Invalid));
    assert_eq!(codec.verify("not a token!", "c", "s"), Err(TokenError::Invalid));
    assert_eq!(codec.verify("", "c", "s"), Err(TokenError::Invalid));
}

#[test]
fn token_issued_for_a_session_that_already_expired_is_useless() {
    let (codec, clock) = codec();
    let mut s = session("c", "s", &clock, 60);
    s.expires_at = Utc::now() - ChronoDuration::days(365 * 10);
    let token = codec.issue(&s).unwrap();
    assert_eq!(codec.verify(&token, "c", "s"), Err(TokenError::Invalid));
}
