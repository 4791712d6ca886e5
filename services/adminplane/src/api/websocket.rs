//! Server-initiated push to connected WebSocket sessions.
use crate::api::error::{ApiError, api_validation_error};
use crate::api::types::{WebSocketSendRequest, WebSocketSendResponse};
use crate::app::AppState;
use crate::ws::Envelope;
use axum::Json;
use axum::extract::State;
use warden_authz::UserId;

#[utoipa::path(
    post,
    path = "/admin/websocket/send",
    tag = "websocket",
    request_body = WebSocketSendRequest,
    responses(
        (status = 200, description = "Number of sessions written", body = WebSocketSendResponse),
        (status = 400, description = "Invalid request", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Missing infra:websocket:send", body = crate::api::types::ErrorResponse)
    )
)]
/// Deliver one envelope to a session, a user, a user type, or everyone.
///
/// Delivery is best effort: sessions whose write fails are not counted.
pub(crate) async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<WebSocketSendRequest>,
) -> Result<Json<WebSocketSendResponse>, ApiError> {
    if request.message_type.trim().is_empty() {
        return Err(api_validation_error("type must not be empty"));
    }
    let envelope = Envelope::new(request.message_type, request.content);
    let delivered = if let Some(session_id) = request.session_id.as_deref() {
        usize::from(state.sessions.send_to(session_id, &envelope).await)
    } else if let Some(user_id) = request.user_id {
        state.sessions.send(UserId::new(user_id), &envelope).await
    } else if let Some(user_type) = request.user_type {
        state
            .sessions
            .broadcast_by_user_type(user_type, &envelope)
            .await
    } else {
        state.sessions.broadcast(&envelope).await
    };
    tracing::debug!(
        message_type = %envelope.message_type,
        delivered,
        "websocket push"
    );
    Ok(Json(WebSocketSendResponse { delivered }))
}
