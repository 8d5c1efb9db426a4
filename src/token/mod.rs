// Identifier obfuscation: reversible, tamper-evident tokens for numeric row ids.
//
// Sequential primary keys never cross the HTTP boundary. Every `*_id` field in
// a request or response carries a token produced here instead, and write paths
// decode it back before touching the database. The construction is a
// deterministic encrypt-then-MAC over HMAC-SHA256: deterministic so that every
// encoding of the same (kind, id) is byte-equal, which the UI relies on when it
// string-compares a row's `manager_id` against a `managers[]` dropdown.
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const VERSION: u8 = 1;
const NONCE_LEN: usize = 8;
const BODY_LEN: usize = 9; // kind byte + u64 id
const TAG_LEN: usize = 10;
const RAW_LEN: usize = 1 + NONCE_LEN + BODY_LEN + TAG_LEN;

// PRF domain separators
const DOMAIN_NONCE: u8 = 0x01;
const DOMAIN_STREAM: u8 = 0x02;
const DOMAIN_TAG: u8 = 0x03;

/// The entity namespaces tokens are bound to. A token minted for one kind
/// never decodes under another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    DevelopmentTeam,
    TestingTeam,
    Manager,
    Client,
    Project,
    Progress,
    DevelopmentTool,
    TestingTool,
}

impl EntityKind {
    fn tag(self) -> u8 {
        match self {
            EntityKind::User => 0x10,
            EntityKind::DevelopmentTeam => 0x20,
            EntityKind::TestingTeam => 0x21,
            EntityKind::Manager => 0x30,
            EntityKind::Client => 0x40,
            EntityKind::Project => 0x50,
            EntityKind::Progress => 0x51,
            EntityKind::DevelopmentTool => 0x60,
            EntityKind::TestingTool => 0x61,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::DevelopmentTeam => "development-team",
            EntityKind::TestingTeam => "testing-team",
            EntityKind::Manager => "manager",
            EntityKind::Client => "client",
            EntityKind::Project => "project",
            EntityKind::Progress => "progress",
            EntityKind::DevelopmentTool => "development-tool",
            EntityKind::TestingTool => "testing-tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(EntityKind::User),
            "development-team" => Some(EntityKind::DevelopmentTeam),
            "testing-team" => Some(EntityKind::TestingTeam),
            "manager" => Some(EntityKind::Manager),
            "client" => Some(EntityKind::Client),
            "project" => Some(EntityKind::Project),
            "progress" => Some(EntityKind::Progress),
            "development-tool" => Some(EntityKind::DevelopmentTool),
            "testing-tool" => Some(EntityKind::TestingTool),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Malformed, tampered, foreign-key, or wrong-kind token. One opaque
    /// variant on purpose: callers must not learn which check failed.
    #[error("invalid identifier token")]
    Invalid,
}

/// Keyed codec between numeric row ids and opaque wire tokens.
///
/// The key comes from explicit configuration, never from a framework secret
/// store. Tokens are stable for the lifetime of the key.
#[derive(Clone)]
pub struct IdCodec {
    key: [u8; 32],
}

impl IdCodec {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Derive the key from an arbitrary secret string.
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    fn prf(&self, domain: u8, parts: &[&[u8]]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac accepts any key length");
        mac.update(&[domain]);
        for p in parts {
            mac.update(p);
        }
        mac.finalize().into_bytes().into()
    }

    /// Encode a (kind, id) pair into an opaque token.
    pub fn encode(&self, kind: EntityKind, id: i64) -> String {
        let id_be = (id as u64).to_be_bytes();
        let plain: [u8; BODY_LEN] = {
            let mut p = [0u8; BODY_LEN];
            p[0] = kind.tag();
            p[1..].copy_from_slice(&id_be);
            p
        };

        // Deterministic synthetic nonce, SIV style: same input, same token.
        let nonce_full = self.prf(DOMAIN_NONCE, &[&[kind.tag()], &id_be]);
        let nonce = &nonce_full[..NONCE_LEN];

        let stream = self.prf(DOMAIN_STREAM, &[nonce]);
        let mut body = [0u8; BODY_LEN];
        for i in 0..BODY_LEN {
            body[i] = plain[i] ^ stream[i];
        }

        let tag_full = self.prf(DOMAIN_TAG, &[nonce, &body]);

        let mut raw = [0u8; RAW_LEN];
        raw[0] = VERSION;
        raw[1..1 + NONCE_LEN].copy_from_slice(nonce);
        raw[1 + NONCE_LEN..1 + NONCE_LEN + BODY_LEN].copy_from_slice(&body);
        raw[1 + NONCE_LEN + BODY_LEN..].copy_from_slice(&tag_full[..TAG_LEN]);

        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Decode a token minted by `encode` for the expected kind.
    ///
    /// Never falls back to treating the input as a raw numeric id.
    pub fn decode(&self, kind: EntityKind, token: &str) -> Result<i64, TokenError> {
        let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| TokenError::Invalid)?;
        if raw.len() != RAW_LEN || raw[0] != VERSION {
            return Err(TokenError::Invalid);
        }

        let nonce = &raw[1..1 + NONCE_LEN];
        let body = &raw[1 + NONCE_LEN..1 + NONCE_LEN + BODY_LEN];
        let tag = &raw[1 + NONCE_LEN + BODY_LEN..];

        let expected_tag = self.prf(DOMAIN_TAG, &[nonce, body]);
        if !ct_eq(tag, &expected_tag[..TAG_LEN]) {
            return Err(TokenError::Invalid);
        }

        let stream = self.prf(DOMAIN_STREAM, &[nonce]);
        let mut plain = [0u8; BODY_LEN];
        for i in 0..BODY_LEN {
            plain[i] = body[i] ^ stream[i];
        }

        if plain[0] != kind.tag() {
            return Err(TokenError::Invalid);
        }

        let mut id_be = [0u8; 8];
        id_be.copy_from_slice(&plain[1..]);
        let id = u64::from_be_bytes(id_be);
        i64::try_from(id).map_err(|_| TokenError::Invalid)
    }
}

/// Constant-time slice comparison for truncated MAC tags.
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Per-request memoization for bulk listings that encode the same id many
/// times (e.g. mapping every manager once before building several response
/// lists). Scoped to one request/response cycle; encoding is deterministic so
/// this is purely an optimization, never a correctness requirement.
pub struct TokenCache<'a> {
    codec: &'a IdCodec,
    map: HashMap<(EntityKind, i64), String>,
}

impl<'a> TokenCache<'a> {
    pub fn new(codec: &'a IdCodec) -> Self {
        Self { codec, map: HashMap::new() }
    }

    pub fn encode(&mut self, kind: EntityKind, id: i64) -> String {
        let codec = self.codec;
        self.map
            .entry((kind, id))
            .or_insert_with(|| codec.encode(kind, id))
            .clone()
    }
}

/// Process-wide codec built from the configured key.
pub fn codec() -> &'static IdCodec {
    use once_cell::sync::Lazy;
    static CODEC: Lazy<IdCodec> =
        Lazy::new(|| IdCodec::from_secret(&crate::config::config().security.token_key));
    &CODEC
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> IdCodec {
        IdCodec::from_secret("unit-test-key")
    }

    #[test]
    fn round_trips_every_kind() {
        let c = codec();
        for kind in [
            EntityKind::User,
            EntityKind::DevelopmentTeam,
            EntityKind::TestingTeam,
            EntityKind::Manager,
            EntityKind::Client,
            EntityKind::Project,
            EntityKind::Progress,
            EntityKind::DevelopmentTool,
            EntityKind::TestingTool,
        ] {
            for id in [1i64, 42, 10_000, i64::MAX] {
                let token = c.encode(kind, id);
                assert_eq!(c.decode(kind, &token), Ok(id), "kind={:?} id={}", kind, id);
            }
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let c = codec();
        let a = c.encode(EntityKind::Manager, 7);
        let b = c.encode(EntityKind::Manager, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn token_is_not_a_plain_encoding_of_the_id() {
        let c = codec();
        let token = c.encode(EntityKind::User, 12345);
        assert!(!token.contains("12345"));
        // Adjacent ids must not produce near-identical tokens
        let next = c.encode(EntityKind::User, 12346);
        let same = token.bytes().zip(next.bytes()).filter(|(a, b)| a == b).count();
        assert!(same < token.len() / 2, "tokens too similar: {} vs {}", token, next);
    }

    #[test]
    fn rejects_malformed_tokens() {
        let c = codec();
        let long = "A".repeat(200);
        for bad in ["", "42", "not-base64!!", "AAAA", long.as_str()] {
            assert_eq!(c.decode(EntityKind::User, bad), Err(TokenError::Invalid));
        }
    }

    #[test]
    fn never_accepts_raw_numeric_ids() {
        let c = codec();
        assert_eq!(c.decode(EntityKind::User, "17"), Err(TokenError::Invalid));
    }

    #[test]
    fn rejects_cross_kind_tokens() {
        let c = codec();
        let token = c.encode(EntityKind::DevelopmentTeam, 3);
        assert_eq!(c.decode(EntityKind::TestingTeam, &token), Err(TokenError::Invalid));
        assert_eq!(c.decode(EntityKind::User, &token), Err(TokenError::Invalid));
        assert_eq!(c.decode(EntityKind::DevelopmentTeam, &token), Ok(3));
    }

    #[test]
    fn rejects_foreign_key_tokens() {
        let ours = codec();
        let theirs = IdCodec::from_secret("a-different-deployment");
        let token = theirs.encode(EntityKind::User, 9);
        assert_eq!(ours.decode(EntityKind::User, &token), Err(TokenError::Invalid));
    }

    #[test]
    fn rejects_tampered_tokens() {
        let c = codec();
        let token = c.encode(EntityKind::Client, 55);
        let mut bytes = URL_SAFE_NO_PAD.decode(&token).unwrap();
        for i in 0..bytes.len() {
            bytes[i] ^= 0x01;
            let forged = URL_SAFE_NO_PAD.encode(&bytes);
            assert_eq!(
                c.decode(EntityKind::Client, &forged),
                Err(TokenError::Invalid),
                "flipping byte {} was accepted",
                i
            );
            bytes[i] ^= 0x01;
        }
    }

    #[test]
    fn cache_returns_decode_equal_tokens() {
        let c = codec();
        let mut cache = TokenCache::new(&c);
        let a = cache.encode(EntityKind::Manager, 11);
        let b = cache.encode(EntityKind::Manager, 11);
        assert_eq!(a, b);
        assert_eq!(c.decode(EntityKind::Manager, &a), Ok(11));
    }
}
