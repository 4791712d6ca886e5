//! Route-level authentication and permission guards.
//!
//! # Purpose
//! [`authenticate`] resolves the caller and stores a [`RequestContext`] in the
//! request extensions; [`require_permission`] consults the enforcer before a
//! guarded handler runs.
//!
//! # Key invariants
//! - Every authenticated request gets a context whose cancellation token is a
//!   child of the server shutdown token.
//! - Only admin user types pass a permission guard; members are forbidden
//!   regardless of grants.
//! - Public routes are mounted outside both layers.
use crate::api::error::{ApiError, api_auth_error, api_forbidden, api_unauthenticated};
use crate::app::AppState;
use crate::auth::authenticate::{AuthError, credential_from_headers};
use crate::auth::rbac::enforcer::PolicyEnforcer;
use crate::context::RequestContext;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use warden_authz::ACTION_ACCESS;

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credential =
        credential_from_headers(request.headers()).map_err(|err| api_auth_error(&err))?;
    let ctx = RequestContext::new(state.shutdown.child_token());
    let (identity, claims) = state
        .authenticator
        .authenticate(&ctx, &credential)
        .await
        .map_err(|err| api_auth_error(&err))?;
    tracing::Span::current().record("user_id", identity.user_id.get());
    request
        .extensions_mut()
        .insert(ctx.with_identity(Arc::new(identity)));
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Permission bound to a route group.
#[derive(Clone)]
pub struct PermissionGuard {
    enforcer: Arc<PolicyEnforcer>,
    permission: &'static str,
}

impl PermissionGuard {
    pub fn new(enforcer: Arc<PolicyEnforcer>, permission: &'static str) -> Self {
        Self {
            enforcer,
            permission,
        }
    }

    pub fn permission(&self) -> &'static str {
        self.permission
    }

    /// Decide for an already-authenticated context.
    pub fn authorize(&self, ctx: Option<&RequestContext>) -> Result<(), ApiError> {
        let Some(identity) = ctx.and_then(|ctx| ctx.identity()) else {
            return Err(api_unauthenticated(&AuthError::MissingCredential));
        };
        if !identity.is_admin() {
            tracing::debug!(
                user_id = identity.user_id.get(),
                user_type = identity.user_type,
                permission = self.permission,
                "non-admin user type rejected by permission guard"
            );
            return Err(api_forbidden("admin account required"));
        }
        let decision = self
            .enforcer
            .check(identity.user_id, self.permission, ACTION_ACCESS);
        if !decision.is_allowed() {
            tracing::debug!(
                user_id = identity.user_id.get(),
                permission = self.permission,
                "permission denied"
            );
            return Err(api_forbidden(&format!(
                "missing permission {}",
                self.permission
            )));
        }
        Ok(())
    }
}

pub async fn require_permission(
    State(guard): State<PermissionGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    guard.authorize(request.extensions().get::<RequestContext>())?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MenuRow, RoleMenuRow, RoleRow, UserRoleRow};
    use crate::store::memory::InMemoryStore;
    use axum::http::StatusCode;
    use warden_authz::{Identity, RoleId, TenantId, USER_TYPE_ADMIN, USER_TYPE_MEMBER, UserId};

    async fn enforcer() -> Arc<PolicyEnforcer> {
        let store = Arc::new(InMemoryStore::new());
        store
            .put_role(RoleRow {
                id: RoleId::new(10),
                tenant_id: TenantId::new(1),
                deleted: false,
            })
            .await;
        store
            .put_menu(MenuRow {
                id: 100,
                permission: "system:user:list".to_string(),
                deleted: false,
            })
            .await;
        store
            .put_role_menu(RoleMenuRow {
                role_id: RoleId::new(10),
                menu_id: 100,
                deleted: false,
            })
            .await;
        for user in [1, 3] {
            store
                .put_user_role(UserRoleRow {
                    user_id: UserId::new(user),
                    role_id: RoleId::new(10),
                    deleted: false,
                })
                .await;
        }
        Arc::new(
            PolicyEnforcer::load(&RequestContext::background(), store)
                .await
                .expect("load"),
        )
    }

    fn ctx(user: i64, user_type: i32) -> RequestContext {
        RequestContext::background().with_identity(Arc::new(Identity::new(
            UserId::new(user),
            user_type,
            TenantId::new(1),
        )))
    }

    #[tokio::test]
    async fn guard_outcomes() {
        let guard = PermissionGuard::new(enforcer().await, "system:user:list");

        guard.authorize(Some(&ctx(1, USER_TYPE_ADMIN))).expect("granted");

        let err = guard.authorize(Some(&ctx(2, USER_TYPE_ADMIN))).expect_err("no role");
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let err = guard.authorize(Some(&ctx(3, USER_TYPE_MEMBER))).expect_err("member");
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let err = guard.authorize(None).expect_err("anonymous");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        let err = guard
            .authorize(Some(&RequestContext::background()))
            .expect_err("no identity");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
