//! Access token minting and verification.
//!
//! # Purpose
//! Define the claim set carried by admin-plane access tokens and the
//! [`TokenService`] that signs and verifies them.
//!
//! # Architectural role
//! The authenticator verifies inbound credentials through [`TokenService`];
//! tests and the login flow of a surrounding deployment mint through it.
//!
//! # Key invariants
//! - Tokens are always EdDSA (Ed25519); other algorithms are rejected.
//! - `iss`, `aud`, `sub`, `exp` are mandatory and validated.
//! - Every token carries a unique `jti` so it can be revoked individually.
//! - The private key is a 32-byte Ed25519 seed; the public key must match it.
//!
//! # Concurrency model
//! Encoding/decoding keys are cached per `kid` behind a `std::sync::RwLock`;
//! reads dominate and writes only happen the first time a key is used.
//!
//! # Examples
//! ```rust
//! use adminplane::auth::access_token::TokenService;
//! use adminplane::auth::keys::signing_keys_from_seed;
//! use adminplane::model::Account;
//! use std::time::Duration;
//! use warden_authz::{TenantId, UserId, USER_TYPE_ADMIN};
//!
//! let tokens = TokenService::new(signing_keys_from_seed([7u8; 32]), "warden", "warden-admin", 5);
//! let account = Account { id: UserId::new(1), user_type: USER_TYPE_ADMIN, tenant_id: TenantId::new(1), status: 0, deleted: false };
//! let token = tokens.mint(&account, Duration::from_secs(60)).unwrap();
//! let claims = tokens.verify(&token).unwrap();
//! assert_eq!(claims.sub, "1");
//! ```
use crate::context::RequestContext;
use crate::model::Account;
use crate::store::{AccountStore, StoreResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use warden_authz::{TenantId, UserId};

const ED25519_KEY_LEN: usize = 32;

/// Claims carried by admin-plane access tokens.
///
/// `sub` is the decimal user id, `uty` the user type and `tid` the tenant id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub uty: i32,
    pub tid: i64,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl AccessClaims {
    /// Parse `sub` back into a user id.
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub
            .parse::<i64>()
            .map(UserId::new)
            .map_err(|_| TokenError::Malformed(format!("subject is not a user id: {}", self.sub)))
    }

    pub fn tenant_id(&self) -> TenantId {
        TenantId::new(self.tid)
    }
}

/// Ed25519 signing key material.
///
/// # Security
/// - Never serialize or log `private_key`.
/// - `alg` must remain EdDSA.
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub kid: String,
    pub alg: Algorithm,
    pub private_key: [u8; ED25519_KEY_LEN],
    pub public_key: [u8; ED25519_KEY_LEN],
}

impl SigningKey {
    /// Validate that the key is EdDSA and the public half matches the seed.
    ///
    /// # Errors
    /// - [`TokenError::Key`] on a non-EdDSA algorithm or mismatched halves.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.alg != Algorithm::EdDSA {
            return Err(TokenError::Key(format!(
                "invalid signing algorithm: {:?}",
                self.alg
            )));
        }
        let signing_key = Ed25519SigningKey::from_bytes(&self.private_key);
        if signing_key.verifying_key().to_bytes() != self.public_key {
            return Err(TokenError::Key(
                "Ed25519 public key does not match private seed".to_string(),
            ));
        }
        Ok(())
    }
}

/// Current signing key plus previous keys still accepted for verification.
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    pub current: SigningKey,
    pub previous: Vec<SigningKey>,
}

impl SigningKeySet {
    pub fn validate(&self) -> Result<(), TokenError> {
        self.current.validate()?;
        for key in &self.previous {
            key.validate()?;
        }
        Ok(())
    }

    /// Current key first, then previous keys in rotation order.
    pub fn all_keys(&self) -> impl Iterator<Item = &SigningKey> {
        std::iter::once(&self.current).chain(self.previous.iter())
    }

    /// Make `next` the signing key; the old current key keeps verifying.
    pub fn rotate(mut self, next: SigningKey) -> Self {
        let old = std::mem::replace(&mut self.current, next);
        self.previous.insert(0, old);
        self
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("invalid token signature or claims: {0}")]
    InvalidSignature(String),
    #[error("token expired")]
    Expired,
    #[error("key error: {0}")]
    Key(String),
    #[error("jwt error: {0}")]
    Jwt(#[source] jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::MissingRequiredClaim(_) => TokenError::Malformed(value.to_string()),
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature => TokenError::InvalidSignature(value.to_string()),
            _ => TokenError::Jwt(value),
        }
    }
}

pub struct TokenService {
    keys: SigningKeySet,
    issuer: String,
    audience: String,
    leeway_secs: u64,
    encoding: RwLock<HashMap<String, EncodingKey>>,
    decoding: RwLock<HashMap<String, DecodingKey>>,
}

impl TokenService {
    pub fn new(
        keys: SigningKeySet,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        leeway_secs: u64,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_secs,
            encoding: RwLock::new(HashMap::new()),
            decoding: RwLock::new(HashMap::new()),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Issue a token for `account` valid for `ttl`.
    ///
    /// # Errors
    /// - [`TokenError::Key`] if the key set is invalid.
    /// - [`TokenError::Jwt`] if encoding fails.
    pub fn mint(&self, account: &Account, ttl: Duration) -> Result<String, TokenError> {
        self.keys.validate()?;
        let now = now_epoch_seconds();
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: account.id.to_string(),
            uty: account.user_type,
            tid: account.tenant_id.get(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let mut header = Header::new(self.keys.current.alg);
        header.kid = Some(self.keys.current.kid.clone());
        let encoding_key = self.encoding_key(&self.keys.current)?;
        jsonwebtoken::encode(&header, &claims, &encoding_key).map_err(TokenError::Jwt)
    }

    /// Verify signature, issuer, audience and expiry.
    ///
    /// The key named by the header `kid` is tried first, then every other key.
    ///
    /// # Errors
    /// - [`TokenError::Malformed`] when the token cannot be parsed.
    /// - [`TokenError::Expired`] past `exp` plus leeway.
    /// - [`TokenError::InvalidSignature`] when no key verifies it, or the
    ///   issuer or audience differ.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.keys.validate()?;
        let header = jsonwebtoken::decode_header(token)
            .map_err(|err| TokenError::Malformed(err.to_string()))?;
        if header.alg != Algorithm::EdDSA {
            return Err(TokenError::InvalidSignature(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let mut ordered: Vec<&SigningKey> = Vec::new();
        if let Some(kid) = header.kid.as_deref()
            && let Some(found) = self.keys.all_keys().find(|key| key.kid == kid)
        {
            ordered.push(found);
        }
        for key in self.keys.all_keys() {
            if !ordered.iter().any(|existing| existing.kid == key.kid) {
                ordered.push(key);
            }
        }

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = self.leeway_secs;

        let mut last_err = None;
        for key in ordered {
            let decoding_key = self.decoding_key(key)?;
            match jsonwebtoken::decode::<AccessClaims>(token, &decoding_key, &validation) {
                Ok(data) => return Ok(data.claims),
                // Claim failures are independent of the key; stop early.
                Err(err) if !matches!(err.kind(), ErrorKind::InvalidSignature) => {
                    return Err(err.into());
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .map(TokenError::from)
            .unwrap_or_else(|| TokenError::InvalidSignature("no verification key".to_string())))
    }

    /// Mark the token identified by `claims.jti` as revoked until it expires.
    pub async fn revoke(
        &self,
        ctx: &RequestContext,
        store: &dyn AccountStore,
        claims: &AccessClaims,
    ) -> StoreResult<()> {
        store.revoke_token(ctx, &claims.jti, claims.exp).await
    }

    fn encoding_key(&self, key: &SigningKey) -> Result<EncodingKey, TokenError> {
        if let Ok(map) = self.encoding.read()
            && let Some(found) = map.get(&key.kid)
        {
            return Ok(found.clone());
        }
        // jsonwebtoken takes EdDSA private keys as PKCS8 DER.
        let der = Ed25519SigningKey::from_bytes(&key.private_key)
            .to_pkcs8_der()
            .map_err(|err| TokenError::Key(format!("encode Ed25519 key: {err}")))?;
        let encoding_key = EncodingKey::from_ed_der(der.as_bytes());
        if let Ok(mut map) = self.encoding.write() {
            map.insert(key.kid.clone(), encoding_key.clone());
        }
        Ok(encoding_key)
    }

    fn decoding_key(&self, key: &SigningKey) -> Result<DecodingKey, TokenError> {
        if let Ok(map) = self.decoding.read()
            && let Some(found) = map.get(&key.kid)
        {
            return Ok(found.clone());
        }
        let x = URL_SAFE_NO_PAD.encode(key.public_key);
        let decoding_key = DecodingKey::from_ed_components(&x).map_err(TokenError::Jwt)?;
        if let Ok(mut map) = self.decoding.write() {
            map.insert(key.kid.clone(), decoding_key.clone());
        }
        Ok(decoding_key)
    }
}

pub(crate) fn now_epoch_seconds() -> i64 {
    // A clock before the epoch clamps to zero rather than panicking.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}
