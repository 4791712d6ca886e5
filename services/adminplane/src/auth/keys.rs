//! Signing key generation for admin-plane access tokens.
//!
//! # Key invariants
//! - Keys are always Ed25519.
//! - The private key is a raw 32-byte seed and the public key is derived from
//!   it, so the two halves cannot disagree.
//! - Private key material must never be serialized or logged.
//!
//! # How to use
//! Call [`generate_signing_keys`] for an ephemeral key set (tokens die with the
//! process), or [`signing_keys_from_seed`] with the configured seed so tokens
//! survive restarts and are shared between replicas.
use crate::auth::access_token::{SigningKey, SigningKeySet};
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use jsonwebtoken::Algorithm;
use rand::RngCore;

/// Generate a fresh Ed25519 key set with no previous keys.
///
/// # Examples
/// ```rust
/// use adminplane::auth::keys::generate_signing_keys;
///
/// let keys = generate_signing_keys();
/// assert!(keys.previous.is_empty());
/// assert_eq!(keys.current.alg, jsonwebtoken::Algorithm::EdDSA);
/// ```
pub fn generate_signing_keys() -> SigningKeySet {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    signing_keys_from_seed(seed)
}

/// Deterministic key set for `seed`.
///
/// The `kid` is the hex of the first eight public key bytes, stable for a
/// given seed.
pub fn signing_keys_from_seed(seed: [u8; 32]) -> SigningKeySet {
    let signing_key = Ed25519SigningKey::from_bytes(&seed);
    let public_key = signing_key.verifying_key().to_bytes();
    SigningKeySet {
        current: SigningKey {
            kid: hex::encode(&public_key[..8]),
            alg: Algorithm::EdDSA,
            private_key: seed,
            public_key,
        },
        previous: Vec::new(),
    }
}

/// Parse a 64-character hex seed.
pub fn parse_seed_hex(raw: &str) -> anyhow::Result<[u8; 32]> {
    let bytes = hex::decode(raw.trim())?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| anyhow::anyhow!("seed must be 32 bytes, got {}", bytes.len()))?;
    Ok(seed)
}
