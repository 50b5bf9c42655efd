//! Bearer token codec.
//!
//! The bearer token proves that its holder knows both halves of a session:
//!
//! 1. the *binding tag* is `base64(HMAC-SHA-256(key = client token, msg = server token))`;
//! 2. a JWS (HS256, keyed by the client token) carries the tag as its audience
//!    claim plus an expiry;
//! 3. the JWS is sealed with ChaCha20-Poly1305 under a key derived from the client token,
//!    and the result is base64url encoded.
//!
//! Verification recomputes the tag from the stored session. Every failure collapses to
//! [`TokenError::Invalid`]; the cause is only logged at debug level.

use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;
use crate::session::Session;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;
const SEAL_CONTEXT: &[u8] = b"sessiongate/seal/v1";
const SEAL_AAD: &[u8] = b"sessiongate/bearer/v1";

/// Claims carried inside the bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    /// Audience; contains the binding tag.
    pub aud: Vec<String>,
    /// Expiry, seconds since the unix epoch.
    pub exp: i64,
    /// Issue time, seconds since the unix epoch.
    #[serde(default)]
    pub iat: i64,
}

fn mac(key: &[u8], msg: &[u8]) -> Result<Vec<u8>, TokenError> {
    let mut m = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| TokenError::Issue(format!("hmac key: {e}")))?;
    m.update(msg);
    Ok(m.finalize().into_bytes().to_vec())
}

/// Keyed digest binding `server_token` to `client_token`.
///
/// Deterministic; without the client token the tag cannot be reproduced.
///
/// # Errors
/// Returns [`TokenError::Issue`] if the HMAC cannot be keyed.
pub fn binding_tag(client_token: &str, server_token: &str) -> Result<String, TokenError> {
    Ok(STANDARD.encode(mac(client_token.as_bytes(), server_token.as_bytes())?))
}

fn cipher(client_token: &str) -> Result<ChaCha20Poly1305, TokenError> {
    let key = mac(client_token.as_bytes(), SEAL_CONTEXT)?;
    ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| TokenError::Issue(format!("seal key: {e}")))
}

/// Issues and verifies sealed bearer tokens.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    clock: Arc<dyn Clock>,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCodec {
    /// Codec that checks expiry against the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Codec that checks expiry against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Sign and seal a token for `session`.
    ///
    /// # Errors
    /// Returns [`TokenError::Issue`] if signing or sealing fails.
    pub fn issue(&self, session: &Session) -> Result<String, TokenError> {
        let claims = BearerClaims {
            aud: vec![binding_tag(&session.client_token, &session.server_token)?],
            exp: session.expires_at.timestamp(),
            iat: self.clock.now().timestamp(),
        };
        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some("JWT".into());
        let jws = jsonwebtoken::encode(
            &header,
            &claims,
            &EncodingKey::from_secret(session.client_token.as_bytes()),
        )
        .map_err(|e| TokenError::Issue(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let payload = Payload {
            msg: jws.as_bytes(),
            aad: SEAL_AAD,
        };
        let sealed = cipher(&session.client_token)?
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|e| TokenError::Issue(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    /// Open and verify `token` against the session's two secrets.
    ///
    /// # Errors
    /// Returns [`TokenError::Invalid`] on any failure.
    pub fn verify(
        &self,
        token: &str,
        client_token: &str,
        server_token: &str,
    ) -> Result<BearerClaims, TokenError> {
        self.open(token, client_token, server_token).map_err(|cause| {
            tracing::debug!(cause, "bearer token rejected");
            TokenError::Invalid
        })
    }

    fn open(
        &self,
        token: &str,
        client_token: &str,
        server_token: &str,
    ) -> Result<BearerClaims, &'static str> {
        let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| "not base64url")?;
        if raw.len() <= NONCE_LEN {
            return Err("too short");
        }
        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let payload = Payload {
            msg: sealed,
            aad: SEAL_AAD,
        };
        let jws = cipher(client_token)
            .map_err(|_| "seal key unavailable")?
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| "seal did not open")?;
        let jws = std::str::from_utf8(&jws).map_err(|_| "payload not utf-8")?;

        let expected =
            binding_tag(client_token, server_token).map_err(|_| "binding tag unavailable")?;
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the injected clock, without leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_audience(&[expected.as_str()]);
        let data = jsonwebtoken::decode::<BearerClaims>(
            jws,
            &DecodingKey::from_secret(client_token.as_bytes()),
            &validation,
        )
        .map_err(|_| "signature or claims invalid")?;

        let claims = data.claims;
        if !claims.aud.iter().any(|a| a == &expected) {
            return Err("audience mismatch");
        }
        if self.clock.now().timestamp() >= claims.exp {
            return Err("expired");
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_tag_matches_known_hmac() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?".
        let tag = binding_tag("Jefe", "what do ya want for nothing?").unwrap();
        let expected = STANDARD.encode([
            0x5b, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24, 0x26, 0x08, 0x95,
            0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27, 0x39, 0x83, 0x9d, 0xec, 0x58, 0xb9,
            0x64, 0xec, 0x38, 0x43,
        ]);
        assert_eq!(tag, expected);
    }

    #[test]
    fn binding_tag_depends_on_both_inputs() {
        let tag = |c: &str, s: &str| binding_tag(c, s).unwrap();
        let base = tag("client", "server");
        assert_eq!(base, tag("client", "server"));
        assert_ne!(base, tag("client2", "server"));
        assert_ne!(base, tag("client", "server2"));
    }

    #[test]
    fn garbage_is_invalid() {
        let codec = TokenCodec::new();
        assert_eq!(codec.verify("", "c", "s"), Err(TokenError::Invalid));
        assert_eq!(codec.verify("!!!", "c", "s"), Err(TokenError::Invalid));
        let zeros = URL_SAFE_NO_PAD.encode([0u8; 40]);
        assert_eq!(codec.verify(&zeros, "c", "s"), Err(TokenError::Invalid));
    }
}
