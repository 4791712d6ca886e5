//! Request-scoped context threaded through every store call.
//!
//! # Purpose
//! Carries the authenticated [`Identity`] (if any) and a cancellation token
//! from the HTTP edge down to the persistence layer, so write hooks can stamp
//! rows and pending queries can be aborted.
//!
//! # Key invariants
//! - The identity is attached once, after authentication, and never mutated.
//! - The context is an explicit value; nothing is read from task-local or
//!   global state.
//! - A context created without an identity represents a system-initiated call.
//!
//! # Examples
//! ```rust
//! use adminplane::context::RequestContext;
//! use std::sync::Arc;
//! use warden_authz::{Identity, TenantId, UserId, USER_TYPE_ADMIN};
//!
//! let ctx = RequestContext::background();
//! assert!(ctx.identity().is_none());
//! let ctx = ctx.with_identity(Arc::new(Identity::new(UserId::new(7), USER_TYPE_ADMIN, TenantId::new(42))));
//! assert_eq!(ctx.identity().map(|id| id.user_id), Some(UserId::new(7)));
//! ```
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use warden_authz::Identity;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    identity: Option<Arc<Identity>>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            identity: None,
            cancel,
        }
    }

    /// Context for work not tied to a caller (boot, pollers, migrations).
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: Arc<Identity>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_deref()
    }

    pub fn shared_identity(&self) -> Option<Arc<Identity>> {
        self.identity.clone()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Handlers receive the context stored by the authentication middleware, or
/// an anonymous one on public routes.
#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_authz::{TenantId, USER_TYPE_ADMIN, UserId};

    #[test]
    fn identity_attaches_without_touching_cancellation() {
        let token = CancellationToken::new();
        let ctx = RequestContext::new(token.child_token());
        let identity = Arc::new(Identity::new(UserId::new(1), USER_TYPE_ADMIN, TenantId::new(2)));
        let ctx = ctx.with_identity(identity.clone());
        assert_eq!(ctx.identity(), Some(identity.as_ref()));
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn extractor_falls_back_to_anonymous() {
        let request = axum::http::Request::builder()
            .uri("/")
            .body(())
            .expect("request");
        let (mut parts, _) = request.into_parts();
        let ctx = RequestContext::from_request_parts(&mut parts, &())
            .await
            .expect("infallible");
        assert!(ctx.identity().is_none());

        let identity = Arc::new(Identity::new(UserId::new(3), USER_TYPE_ADMIN, TenantId::new(4)));
        parts
            .extensions
            .insert(RequestContext::background().with_identity(identity));
        let ctx = RequestContext::from_request_parts(&mut parts, &())
            .await
            .expect("infallible");
        assert_eq!(ctx.identity().map(|id| id.user_id), Some(UserId::new(3)));
    }
}
