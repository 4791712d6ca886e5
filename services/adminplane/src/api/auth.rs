//! Session termination for authenticated callers.
use crate::api::error::{ApiError, api_internal, api_unauthenticated};
use crate::app::AppState;
use crate::auth::access_token::AccessClaims;
use crate::auth::authenticate::AuthError;
use crate::context::RequestContext;
use crate::model::Row;
use crate::store::memory::LOGIN_LOG_TABLE;
use axum::Extension;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;

/// `system_login_log.log_type` for a logout.
pub const LOGIN_LOG_TYPE_LOGOUT: i64 = 2;
pub const LOGIN_RESULT_SUCCESS: i64 = 0;

#[utoipa::path(
    post,
    path = "/admin/auth/logout",
    tag = "auth",
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Not authenticated", body = crate::api::types::ErrorResponse)
    )
)]
/// Revoke the caller's token and record the logout.
///
/// # Errors
/// - 500 if the revocation cannot be stored. A failed log write is only
///   logged; the token is already revoked by then.
pub(crate) async fn logout(
    State(state): State<AppState>,
    ctx: RequestContext,
    claims: Option<Extension<AccessClaims>>,
) -> Result<StatusCode, ApiError> {
    let Some(Extension(claims)) = claims else {
        return Err(api_unauthenticated(&AuthError::MissingCredential));
    };
    let Some(identity) = ctx.identity() else {
        return Err(api_unauthenticated(&AuthError::MissingCredential));
    };
    state
        .tokens
        .revoke(&ctx, state.accounts.as_ref(), &claims)
        .await
        .map_err(|err| api_internal("failed to revoke token", &err))?;

    let row = Row::from([
        ("log_type".to_string(), json!(LOGIN_LOG_TYPE_LOGOUT)),
        ("user_id".to_string(), json!(identity.user_id.get())),
        ("user_type".to_string(), json!(identity.user_type)),
        ("result".to_string(), json!(LOGIN_RESULT_SUCCESS)),
    ]);
    if let Err(err) = state.repository.insert(&ctx, LOGIN_LOG_TABLE, row).await {
        tracing::warn!(error = %err, user_id = identity.user_id.get(), "logout log write failed");
    }
    tracing::info!(user_id = identity.user_id.get(), jti = %claims.jti, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}
