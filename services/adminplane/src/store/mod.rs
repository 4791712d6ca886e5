use crate::context::RequestContext;
use crate::model::{Account, RoleGrantRow, Row, TableSchema};
use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;
use warden_authz::{RoleId, TenantId, UserId};

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only projection of the authorization tables.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Distinct `(role, permission)` over role ⋈ role_menu ⋈ menu, all rows
    /// undeleted and permission non-empty.
    async fn role_grants(&self, ctx: &RequestContext) -> StoreResult<Vec<RoleGrantRow>>;
    /// `(user, role)` over user_role ⋈ role, both rows undeleted.
    async fn user_assignments(&self, ctx: &RequestContext)
    -> StoreResult<Vec<(UserId, RoleId)>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_account(
        &self,
        ctx: &RequestContext,
        user_type: i32,
        user_id: UserId,
    ) -> StoreResult<Option<Account>>;
    /// Undeleted roles assigned to `user_id` within `tenant_id`.
    async fn role_ids_for_user(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> StoreResult<Vec<RoleId>>;
    /// Record `jti` as revoked until `expires_at` (unix seconds).
    async fn revoke_token(&self, ctx: &RequestContext, jti: &str, expires_at: i64)
    -> StoreResult<()>;
    async fn is_token_revoked(&self, ctx: &RequestContext, jti: &str) -> StoreResult<bool>;
}

/// Untyped row access used by the audited repository.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn table_schema(&self, ctx: &RequestContext, table: &str) -> StoreResult<TableSchema>;
    /// Insert and return the stored row, including generated columns.
    async fn insert_row(
        &self,
        ctx: &RequestContext,
        schema: &TableSchema,
        row: Row,
    ) -> StoreResult<Row>;
    /// Apply `patch` to row `id` when it also matches every entry of `filter`;
    /// a row that exists outside the filter is reported as `NotFound`.
    async fn update_row(
        &self,
        ctx: &RequestContext,
        schema: &TableSchema,
        id: i64,
        filter: &Row,
        patch: Row,
    ) -> StoreResult<Row>;
    /// Rows whose columns equal every entry of `filter`.
    async fn select_rows(
        &self,
        ctx: &RequestContext,
        schema: &TableSchema,
        filter: &Row,
    ) -> StoreResult<Vec<Row>>;
}

#[async_trait]
pub trait AdminPlaneStore: PolicySource + AccountStore + RowStore {
    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

/// Run `fut` unless the request is cancelled first.
pub(crate) async fn cancellable<T, F>(ctx: &RequestContext, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    if ctx.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = ctx.cancellation().cancelled() => Err(StoreError::Cancelled),
        result = fut => result,
    }
}
