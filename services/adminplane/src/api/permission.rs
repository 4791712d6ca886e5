//! Permission administration handlers.
//!
//! # Purpose and responsibility
//! `POST /admin/permission/reload` rebuilds the policy snapshot from the
//! authorization tables after administrators edit them; `GET
//! /admin/permission/me` reports what the caller is currently granted.
//!
//! # Key invariants and assumptions
//! - Reload is guarded by `system:permission:reload`; the guard runs before
//!   the handler.
//! - A failed reload answers 503 and the previous snapshot keeps serving.
use crate::api::error::{ApiError, api_policy_load_failed, api_unauthenticated};
use crate::api::types::PermissionInfoResponse;
use crate::app::AppState;
use crate::auth::authenticate::AuthError;
use crate::auth::rbac::enforcer::ReloadReport;
use crate::auth::rbac::permissions::effective_permissions;
use crate::context::RequestContext;
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    post,
    path = "/admin/permission/reload",
    tag = "permission",
    responses(
        (status = 200, description = "Snapshot rebuilt", body = ReloadReport),
        (status = 401, description = "Not authenticated", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Missing system:permission:reload", body = crate::api::types::ErrorResponse),
        (status = 503, description = "Policy load failed; previous policy kept", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn reload_policy(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ReloadReport>, ApiError> {
    let report = state
        .enforcer
        .reload(&ctx)
        .await
        .map_err(|err| api_policy_load_failed(&err))?;
    tracing::info!(
        user_id = ctx.identity().map(|identity| identity.user_id.get()),
        grants = report.grants,
        assignments = report.assignments,
        "policy reloaded on request"
    );
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/admin/permission/me",
    tag = "permission",
    responses(
        (status = 200, description = "Caller identity and granted permissions", body = PermissionInfoResponse),
        (status = 401, description = "Not authenticated", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn permission_info(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<PermissionInfoResponse>, ApiError> {
    let identity = ctx
        .identity()
        .ok_or_else(|| api_unauthenticated(&AuthError::MissingCredential))?;
    Ok(Json(PermissionInfoResponse {
        user_id: identity.user_id.get(),
        user_type: identity.user_type,
        tenant_id: identity.tenant_id.get(),
        role_ids: identity.role_ids.iter().map(|role| role.get()).collect(),
        permissions: effective_permissions(&state.enforcer, identity.user_id),
    }))
}
