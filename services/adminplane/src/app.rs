//! Admin-plane HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! Route groups, outermost first:
//! - public: system endpoints, the OpenAPI document, and `/ws` (which
//!   authenticates itself before upgrading)
//! - authenticated: everything under `/admin`
//! - permission-guarded: admin routes bound to a permission string
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::audit::Repository;
use crate::auth::access_token::TokenService;
use crate::auth::authenticate::Authenticator;
use crate::auth::middleware::{PermissionGuard, authenticate, require_permission};
use crate::auth::rbac::enforcer::{EnforcerError, PolicyEnforcer};
use crate::auth::rbac::permissions::{PERMISSION_POLICY_RELOAD, PERMISSION_WEBSOCKET_SEND};
use crate::context::RequestContext;
use crate::observability;
use crate::store::{AccountStore, AdminPlaneStore, PolicySource};
use crate::ws::handler::websocket_upgrade;
use crate::ws::{ListenerSet, SessionRegistry};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

pub const SERVICE_NAME: &str = "warden-adminplane";
pub const API_VERSION: &str = "v1";

#[derive(Clone)]
pub struct AppState {
    pub service_name: String,
    pub api_version: String,
    pub store: Arc<dyn AdminPlaneStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub enforcer: Arc<PolicyEnforcer>,
    pub authenticator: Arc<Authenticator>,
    pub tokens: Arc<TokenService>,
    pub repository: Arc<Repository>,
    pub sessions: Arc<SessionRegistry>,
    pub listeners: Arc<ListenerSet>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the state around `store` with an enforcer that has not loaded yet.
    pub fn new<S>(store: Arc<S>, tokens: Arc<TokenService>, shutdown: CancellationToken) -> Self
    where
        S: AdminPlaneStore + 'static,
    {
        let source: Arc<dyn PolicySource> = store.clone();
        Self::with_enforcer(store, tokens, shutdown, PolicyEnforcer::uninitialized(source))
    }

    /// Wire the state and perform the initial policy load.
    ///
    /// # Errors
    /// - [`EnforcerError::PolicyLoad`] when the tables cannot be read; the
    ///   binary treats this as fatal.
    pub async fn load<S>(
        store: Arc<S>,
        tokens: Arc<TokenService>,
        shutdown: CancellationToken,
    ) -> Result<Self, EnforcerError>
    where
        S: AdminPlaneStore + 'static,
    {
        let source: Arc<dyn PolicySource> = store.clone();
        let ctx = RequestContext::new(shutdown.child_token());
        let enforcer = PolicyEnforcer::load(&ctx, source).await?;
        Ok(Self::with_enforcer(store, tokens, shutdown, enforcer))
    }

    fn with_enforcer<S>(
        store: Arc<S>,
        tokens: Arc<TokenService>,
        shutdown: CancellationToken,
        enforcer: PolicyEnforcer,
    ) -> Self
    where
        S: AdminPlaneStore + 'static,
    {
        let accounts: Arc<dyn AccountStore> = store.clone();
        Self {
            service_name: SERVICE_NAME.to_string(),
            api_version: API_VERSION.to_string(),
            authenticator: Arc::new(Authenticator::new(tokens.clone(), accounts.clone())),
            repository: Arc::new(Repository::new(store.clone())),
            store,
            accounts,
            enforcer: Arc::new(enforcer),
            tokens,
            sessions: Arc::new(SessionRegistry::new()),
            listeners: Arc::new(ListenerSet::with_defaults()),
            shutdown,
        }
    }
}

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn guarded(
    routes: Router<AppState>,
    enforcer: &Arc<PolicyEnforcer>,
    permission: &'static str,
) -> Router<AppState> {
    routes.route_layer(middleware::from_fn_with_state(
        PermissionGuard::new(enforcer.clone(), permission),
        require_permission,
    ))
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                user_id = tracing::field::Empty
            );
            span.set_parent(parent);
            span
        });

    let reload = guarded(
        Router::new().route(
            "/admin/permission/reload",
            post(api::permission::reload_policy),
        ),
        &state.enforcer,
        PERMISSION_POLICY_RELOAD,
    );
    let push = guarded(
        Router::new().route(
            "/admin/websocket/send",
            post(api::websocket::send_message),
        ),
        &state.enforcer,
        PERMISSION_WEBSOCKET_SEND,
    );
    let admin = Router::new()
        .route("/admin/auth/logout", post(api::auth::logout))
        .route("/admin/permission/me", get(api::permission::permission_info))
        .merge(reload)
        .merge(push)
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/v1/system/info", get(api::system::system_info))
        .route("/v1/system/health", get(api::system::system_health))
        .route("/v1/openapi.json", get(openapi_document))
        .route("/ws", get(websocket_upgrade))
        .merge(admin)
        .layer(trace_layer)
        .with_state(state)
}
