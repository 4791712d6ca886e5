//! HTTP API request/response types.
//!
//! # Purpose
//! Defines shared payload shapes for the admin-plane REST API and OpenAPI
//! schema generation.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SystemInfo {
    pub service: String,
    pub api_version: String,
    pub storage_backend: String,
    pub durable_storage: bool,
    /// `ready` once the first policy snapshot is published.
    pub policy_state: String,
    pub websocket_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    /// Machine-readable cause, e.g. `expired_credential` on a 401.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub request_id: Option<String>,
}

/// Caller identity and the permissions its roles grant.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PermissionInfoResponse {
    pub user_id: i64,
    pub user_type: i32,
    pub tenant_id: i64,
    pub role_ids: Vec<i64>,
    pub permissions: Vec<String>,
}

/// Push request for connected WebSocket sessions.
///
/// Targets are evaluated in order: `sessionId`, `userId`, `userType`; with
/// none set the message goes to every session.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketSendRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_type: Option<i32>,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub content: Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct WebSocketSendResponse {
    pub delivered: usize,
}
