//! Credential verification and identity resolution.
//!
//! # Purpose
//! Turn a raw bearer credential into an [`Identity`]: verify the token, reject
//! revoked tokens and inactive accounts, then attach the caller's role ids.
//!
//! # Key invariants
//! - Authentication never consults the policy; it only establishes who the
//!   caller is.
//! - Each failure maps to exactly one [`AuthError`] variant with a stable
//!   reason code.
use crate::auth::access_token::{AccessClaims, TokenError, TokenService};
use crate::context::RequestContext;
use crate::store::{AccountStore, StoreError};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use std::sync::Arc;
use thiserror::Error;
use warden_authz::Identity;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const ACCESS_TOKEN_QUERY: &str = "token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("malformed credential: {0}")]
    MalformedCredential(String),
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("credential expired")]
    ExpiredCredential,
    #[error("credential revoked")]
    RevokedCredential,
    #[error("user is disabled or deleted")]
    InactiveUser,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Stable reason code reported in the 401 body.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::MalformedCredential(_) => "malformed_credential",
            AuthError::InvalidSignature(_) => "invalid_signature",
            AuthError::ExpiredCredential => "expired_credential",
            AuthError::RevokedCredential => "revoked_credential",
            AuthError::InactiveUser => "inactive_user",
            AuthError::Store(_) => "store_unavailable",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Expired => AuthError::ExpiredCredential,
            TokenError::Malformed(reason) => AuthError::MalformedCredential(reason),
            TokenError::InvalidSignature(reason) => AuthError::InvalidSignature(reason),
            TokenError::Key(reason) => AuthError::InvalidSignature(reason),
            TokenError::Jwt(err) => AuthError::MalformedCredential(err.to_string()),
        }
    }
}

pub struct Authenticator {
    tokens: Arc<TokenService>,
    accounts: Arc<dyn AccountStore>,
}

impl Authenticator {
    pub fn new(tokens: Arc<TokenService>, accounts: Arc<dyn AccountStore>) -> Self {
        Self { tokens, accounts }
    }

    pub fn verify(&self, credential: &str) -> Result<AccessClaims, AuthError> {
        if credential.trim().is_empty() {
            return Err(AuthError::MissingCredential);
        }
        Ok(self.tokens.verify(credential.trim())?)
    }

    /// Resolve verified claims into an identity.
    ///
    /// # Errors
    /// - [`AuthError::RevokedCredential`] if the `jti` was revoked.
    /// - [`AuthError::InactiveUser`] if the account is missing, disabled or deleted.
    /// - [`AuthError::Store`] on store failure.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        claims: &AccessClaims,
    ) -> Result<Identity, AuthError> {
        if self.accounts.is_token_revoked(ctx, &claims.jti).await? {
            return Err(AuthError::RevokedCredential);
        }
        let user_id = claims.user_id()?;
        let account = self
            .accounts
            .find_account(ctx, claims.uty, user_id)
            .await?
            .filter(|account| account.is_active())
            .ok_or(AuthError::InactiveUser)?;
        let roles = self
            .accounts
            .role_ids_for_user(ctx, account.id, account.tenant_id)
            .await?;
        Ok(
            Identity::new(account.id, account.user_type, account.tenant_id)
                .with_roles(roles)
                .with_validity(claims.iat, claims.exp),
        )
    }

    pub async fn authenticate(
        &self,
        ctx: &RequestContext,
        credential: &str,
    ) -> Result<(Identity, AccessClaims), AuthError> {
        let claims = self.verify(credential)?;
        let identity = self.resolve(ctx, &claims).await?;
        Ok((identity, claims))
    }
}

/// Token from `Authorization: Bearer <token>`.
///
/// Returns `Err(MalformedCredential)` when the header exists but is not a
/// bearer credential, and `Ok(None)` when it is absent.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AuthError::MalformedCredential("authorization header".to_string()))?;
    let mut parts = value.splitn(2, ' ');
    match (parts.next(), parts.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") => {
            Ok(Some(token.trim().to_string()))
        }
        _ => Err(AuthError::MalformedCredential(
            "expected bearer credential".to_string(),
        )),
    }
}

pub fn cookie_token(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Value of `name` in a raw query string.
pub fn query_token(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Header credential first, then the `access_token` cookie.
pub fn credential_from_headers(headers: &HeaderMap) -> Result<String, AuthError> {
    if let Some(token) = bearer_token(headers)? {
        return Ok(token);
    }
    cookie_token(headers, ACCESS_TOKEN_COOKIE).ok_or(AuthError::MissingCredential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::signing_keys_from_seed;
    use crate::model::{
        ACCOUNT_STATUS_DISABLED, ACCOUNT_STATUS_ENABLED, Account, RoleRow, UserRoleRow,
    };
    use crate::store::memory::InMemoryStore;
    use axum::http::HeaderValue;
    use std::time::Duration;
    use warden_authz::{RoleId, TenantId, USER_TYPE_ADMIN, UserId};

    fn admin(id: i64) -> Account {
        Account {
            id: UserId::new(id),
            user_type: USER_TYPE_ADMIN,
            tenant_id: TenantId::new(1),
            status: ACCOUNT_STATUS_ENABLED,
            deleted: false,
        }
    }

    async fn fixture() -> (Authenticator, Arc<TokenService>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.put_account(admin(1)).await;
        store
            .put_role(RoleRow {
                id: RoleId::new(10),
                tenant_id: TenantId::new(1),
                deleted: false,
            })
            .await;
        store
            .put_role(RoleRow {
                id: RoleId::new(11),
                tenant_id: TenantId::new(2),
                deleted: false,
            })
            .await;
        for role in [10, 11] {
            store
                .put_user_role(UserRoleRow {
                    user_id: UserId::new(1),
                    role_id: RoleId::new(role),
                    deleted: false,
                })
                .await;
        }
        let tokens = Arc::new(TokenService::new(
            signing_keys_from_seed([4; 32]),
            "warden",
            "warden-admin",
            0,
        ));
        let authenticator = Authenticator::new(tokens.clone(), store.clone());
        (authenticator, tokens, store)
    }

    #[tokio::test]
    async fn authenticate_resolves_identity_with_tenant_roles() {
        let (authenticator, tokens, _) = fixture().await;
        let token = tokens.mint(&admin(1), Duration::from_secs(60)).expect("mint");
        let (identity, claims) = authenticator
            .authenticate(&RequestContext::background(), &token)
            .await
            .expect("authenticate");
        assert_eq!(identity.user_id, UserId::new(1));
        assert!(identity.is_admin());
        // Role 11 belongs to another tenant.
        assert_eq!(identity.role_ids.iter().copied().collect::<Vec<_>>(), vec![RoleId::new(10)]);
        assert_eq!(identity.expires_at, claims.exp);
    }

    #[tokio::test]
    async fn failures_carry_distinct_reasons() {
        let (authenticator, tokens, store) = fixture().await;
        let ctx = RequestContext::background();

        let err = authenticator.authenticate(&ctx, "").await.expect_err("missing");
        assert_eq!(err.reason(), "missing_credential");

        let err = authenticator.authenticate(&ctx, "a.b").await.expect_err("malformed");
        assert_eq!(err.reason(), "malformed_credential");

        let foreign = TokenService::new(signing_keys_from_seed([5; 32]), "warden", "warden-admin", 0)
            .mint(&admin(1), Duration::from_secs(60))
            .expect("mint");
        let err = authenticator.authenticate(&ctx, &foreign).await.expect_err("signature");
        assert_eq!(err.reason(), "invalid_signature");

        let token = tokens.mint(&admin(1), Duration::from_secs(60)).expect("mint");
        let claims = tokens.verify(&token).expect("verify");
        tokens.revoke(&ctx, store.as_ref(), &claims).await.expect("revoke");
        let err = authenticator.authenticate(&ctx, &token).await.expect_err("revoked");
        assert_eq!(err.reason(), "revoked_credential");

        let mut disabled = admin(1);
        disabled.status = ACCOUNT_STATUS_DISABLED;
        store.put_account(disabled).await;
        let token = tokens.mint(&admin(1), Duration::from_secs(60)).expect("mint");
        let err = authenticator.authenticate(&ctx, &token).await.expect_err("inactive");
        assert_eq!(err.reason(), "inactive_user");
    }

    #[tokio::test]
    async fn unknown_account_is_inactive() {
        let (authenticator, tokens, _) = fixture().await;
        let token = tokens.mint(&admin(99), Duration::from_secs(60)).expect("mint");
        let err = authenticator
            .authenticate(&RequestContext::background(), &token)
            .await
            .expect_err("unknown");
        assert!(matches!(err, AuthError::InactiveUser));
    }

    #[test]
    fn credential_extraction_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; access_token=from-cookie"));
        assert_eq!(credential_from_headers(&headers).expect("cookie"), "from-cookie");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(credential_from_headers(&headers).expect("header"), "from-header");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(
            credential_from_headers(&headers),
            Err(AuthError::MalformedCredential(_))
        ));

        assert!(matches!(
            credential_from_headers(&HeaderMap::new()),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn query_token_finds_named_parameter() {
        assert_eq!(query_token(Some("a=1&token=xyz"), "token").as_deref(), Some("xyz"));
        assert_eq!(query_token(Some("a=1"), "token"), None);
        assert_eq!(query_token(None, "token"), None);
    }
}
