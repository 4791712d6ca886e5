//! OpenAPI schema aggregation for the admin-plane API.
//!
//! # Purpose
//! Collects all routes and schema types into a single OpenAPI document served
//! at `/v1/openapi.json`.
use crate::api::{
    auth, permission, system,
    types::{
        ErrorResponse, HealthStatus, PermissionInfoResponse, SystemInfo, WebSocketSendRequest,
        WebSocketSendResponse,
    },
    websocket,
};
use crate::auth::rbac::enforcer::ReloadReport;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "warden-adminplane",
        version = "v1",
        description = "Multi-tenant RBAC admin plane HTTP API"
    ),
    paths(
        system::system_info,
        system::system_health,
        auth::logout,
        permission::reload_policy,
        permission::permission_info,
        websocket::send_message
    ),
    components(schemas(
        SystemInfo,
        HealthStatus,
        ErrorResponse,
        ReloadReport,
        PermissionInfoResponse,
        WebSocketSendRequest,
        WebSocketSendResponse
    )),
    tags(
        (name = "system", description = "System and discovery endpoints"),
        (name = "auth", description = "Session termination"),
        (name = "permission", description = "Policy reload and effective permissions"),
        (name = "websocket", description = "Server push to connected sessions")
    )
)]
pub struct ApiDoc;
