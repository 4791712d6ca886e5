//! `GET /ws`: authenticated WebSocket sessions.
//!
//! The caller is authenticated before the upgrade is accepted. Browsers cannot
//! set headers on an upgrade request, so the credential may also arrive as
//! `?token=`.
use super::listener::{parse_inbound, session_announcement};
use super::registry::Session;
use crate::api::error::{ApiError, api_auth_error, api_unauthenticated, api_validation_error};
use crate::app::AppState;
use crate::auth::authenticate::{
    ACCESS_TOKEN_QUERY, AuthError, credential_from_headers, query_token,
};
use crate::context::RequestContext;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::StreamExt;
use std::sync::Arc;
use warden_authz::Identity;

pub async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    upgrade: Option<WebSocketUpgrade>,
) -> Result<Response, ApiError> {
    let credential = match credential_from_headers(&headers) {
        Ok(credential) => credential,
        Err(AuthError::MissingCredential) => query_token(query.as_deref(), ACCESS_TOKEN_QUERY)
            .ok_or_else(|| api_unauthenticated(&AuthError::MissingCredential))?,
        Err(err) => return Err(api_auth_error(&err)),
    };
    let ctx = RequestContext::new(state.shutdown.child_token());
    let (identity, _claims) = state
        .authenticator
        .authenticate(&ctx, &credential)
        .await
        .map_err(|err| api_auth_error(&err))?;
    let Some(upgrade) = upgrade else {
        return Err(api_validation_error("websocket upgrade required"));
    };
    Ok(upgrade.on_upgrade(move |socket| run_session(state, identity, socket)))
}

async fn run_session(state: AppState, identity: Identity, socket: WebSocket) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (sink, mut stream) = socket.split();
    let session = Arc::new(Session::new(session_id.clone(), &identity, Box::new(sink)));
    state.sessions.add(session.clone());
    if let Err(err) = session.send(&session_announcement(&session_id)).await {
        tracing::debug!(session_id = %session_id, error = %err, "session announcement failed");
        state.sessions.remove(&session_id);
        return;
    }
    tracing::info!(
        session_id = %session_id,
        user_id = identity.user_id.get(),
        user_type = identity.user_type,
        "websocket session opened"
    );

    let shutdown = state.shutdown.clone();
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = stream.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                if let Some(envelope) = parse_inbound(&text) {
                    state.listeners.dispatch(&session, envelope).await;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                tracing::debug!(session_id = %session_id, error = %err, "websocket read failed");
                break;
            }
        }
    }

    state.sessions.remove(&session_id);
    if let Err(err) = session.close().await {
        tracing::debug!(session_id = %session_id, error = %err, "websocket close failed");
    }
    tracing::info!(session_id = %session_id, "websocket session closed");
}
