//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error response construction to keep error shapes uniform
//! across admin-plane endpoints.
//!
//! # Key invariants and assumptions
//! - Error responses must include a stable `code` and human-readable `message`.
//! - Status codes must align with the error category.
//! - Authentication failures carry the reason code in `reason`.
//!
//! # Security considerations
//! - Internal errors log details server-side but return generic messages.
use crate::api::types::ErrorResponse;
use crate::auth::authenticate::AuthError;
use crate::auth::rbac::enforcer::EnforcerError;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers and middleware.
///
/// # Invariants
/// - `status` must match the semantics of `body.code`.
///
/// # Example
/// ```rust
/// use adminplane::api::error::api_forbidden;
/// use axum::http::StatusCode;
///
/// let err = api_forbidden("missing permission");
/// assert_eq!(err.status, StatusCode::FORBIDDEN);
/// assert_eq!(err.body.code, "forbidden");
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn api_error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
            reason: None,
            request_id: None,
        },
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Build a 401 error with the authentication failure reason.
pub fn api_unauthenticated(err: &AuthError) -> ApiError {
    tracing::debug!(reason = err.reason(), error = %err, "authentication rejected");
    let mut api = api_error(
        StatusCode::UNAUTHORIZED,
        "unauthenticated",
        "authentication required",
    );
    api.body.reason = Some(err.reason().to_string());
    api
}

/// Map an authentication failure to its HTTP shape.
///
/// Credential problems are 401. A store failure while resolving the identity
/// says nothing about the credential, so it is a 503 `store_unavailable`
/// without details.
pub fn api_auth_error(err: &AuthError) -> ApiError {
    match err {
        AuthError::Store(store_err) => {
            tracing::error!(error = ?store_err, "identity resolution hit a storage error");
            let mut api = api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                "identity store unavailable; retry later",
            );
            api.body.reason = Some(err.reason().to_string());
            api
        }
        _ => api_unauthenticated(err),
    }
}

pub fn api_forbidden(message: &str) -> ApiError {
    api_error(StatusCode::FORBIDDEN, "forbidden", message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

/// Build a 503 for a failed policy reload. The previous snapshot still serves.
pub fn api_policy_load_failed(err: &EnforcerError) -> ApiError {
    tracing::warn!(error = %err, "reload request failed");
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "policy_load_failed",
        "policy reload failed; previous policy remains active",
    )
}

/// Build a 500 Internal Server Error from a store error.
///
/// # What it does
/// Logs the store error and returns a generic internal error response.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "adminplane storage error");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

/// Map a store error from a data-access call to its HTTP shape.
pub fn api_store_error(message: &str, err: &StoreError) -> ApiError {
    match err {
        StoreError::NotFound(detail) => api_not_found(detail),
        StoreError::Invalid(detail) => api_validation_error(detail),
        _ => api_internal(message, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_helpers_build_expected_codes() {
        let not_found = api_not_found("missing");
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.body.code, "not_found");

        let forbidden = api_forbidden("nope");
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
        assert_eq!(forbidden.body.code, "forbidden");
        assert!(forbidden.body.reason.is_none());

        let validation = api_validation_error("bad");
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);
        assert_eq!(validation.body.code, "validation_error");

        let load = api_policy_load_failed(&EnforcerError::PolicyLoad(StoreError::Conflict(
            "busy".to_string(),
        )));
        assert_eq!(load.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(load.body.code, "policy_load_failed");
    }

    #[test]
    fn unauthenticated_carries_reason() {
        let api = api_unauthenticated(&AuthError::ExpiredCredential);
        assert_eq!(api.status, StatusCode::UNAUTHORIZED);
        assert_eq!(api.body.code, "unauthenticated");
        assert_eq!(api.body.reason.as_deref(), Some("expired_credential"));
    }

    #[test]
    fn auth_store_failure_is_unavailable_not_unauthenticated() {
        let api = api_auth_error(&AuthError::Store(StoreError::Unexpected(anyhow::anyhow!(
            "connection refused"
        ))));
        assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api.body.code, "store_unavailable");
        assert!(!api.body.message.contains("connection refused"));

        let api = api_auth_error(&AuthError::RevokedCredential);
        assert_eq!(api.status, StatusCode::UNAUTHORIZED);
        assert_eq!(api.body.reason.as_deref(), Some("revoked_credential"));
    }

    #[test]
    fn store_errors_map_by_kind() {
        let api = api_store_error("x", &StoreError::NotFound("row 1".to_string()));
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        let api = api_store_error("x", &StoreError::Invalid("bad column".to_string()));
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        let api = api_store_error("storage failed", &StoreError::Cancelled);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body.message, "storage failed");
    }
}
