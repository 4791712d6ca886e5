//! In-memory implementation of the admin-plane store.
//!
//! # Purpose
//! Implements the store traits entirely in memory using maps guarded by
//! `tokio::sync::RwLock`. It exists for:
//! - local development and tests (no external dependencies)
//! - deployments where durability is not required
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Single-process consistency**: writes take the write side of one lock per
//!   table; the policy projection reads all four authorization tables under
//!   their read locks.
//!
//! # Soft deletes
//! Authorization rows are never removed; callers flip `deleted` through the
//! `put_*` helpers, which upsert by key. The projections skip deleted rows the
//! same way the SQL joins do.
//!
//! # Generic tables
//! Tables used by the audited repository are registered with a [`TableSchema`].
//! Inserts fill omitted columns from the declared defaults and assign `id` from
//! a per-table sequence.
use super::{
    AccountStore, AdminPlaneStore, PolicySource, RowStore, StoreError, StoreResult, cancellable,
};
use crate::context::RequestContext;
use crate::model::{
    Account, COLUMN_CREATE_TIME, COLUMN_CREATOR, COLUMN_ID, COLUMN_TENANT_ID, COLUMN_UPDATE_TIME,
    COLUMN_UPDATER, ColumnDef, ColumnKind, MenuRow, RoleGrantRow, RoleMenuRow, RoleRow, Row,
    TableSchema, UserRoleRow,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use warden_authz::{RoleId, TenantId, USER_TYPE_ADMIN, USER_TYPE_MEMBER, UserId};

pub const LOGIN_LOG_TABLE: &str = "system_login_log";

/// Schema of `system_login_log`, shared with the Postgres migration.
pub fn login_log_schema() -> TableSchema {
    TableSchema::new(
        LOGIN_LOG_TABLE,
        vec![
            ColumnDef::new(COLUMN_ID, ColumnKind::Int).not_null(),
            ColumnDef::new("log_type", ColumnKind::Int).not_null(),
            ColumnDef::new("user_id", ColumnKind::Int).not_null(),
            ColumnDef::new("user_type", ColumnKind::Int).not_null(),
            ColumnDef::new("result", ColumnKind::Int).with_default(json!(0)),
            ColumnDef::new(COLUMN_CREATOR, ColumnKind::Text).with_default(json!("")),
            ColumnDef::new(COLUMN_UPDATER, ColumnKind::Text).with_default(json!("")),
            ColumnDef::new(COLUMN_TENANT_ID, ColumnKind::Int).with_default(json!(0)),
            ColumnDef::new(COLUMN_CREATE_TIME, ColumnKind::Timestamp),
            ColumnDef::new(COLUMN_UPDATE_TIME, ColumnKind::Timestamp),
        ],
    )
}

#[derive(Debug)]
struct TableData {
    schema: TableSchema,
    next_id: i64,
    rows: Vec<Row>,
}

impl TableData {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            next_id: 1,
            rows: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    roles: Arc<RwLock<HashMap<RoleId, RoleRow>>>,
    menus: Arc<RwLock<HashMap<i64, MenuRow>>>,
    user_roles: Arc<RwLock<HashMap<(UserId, RoleId), UserRoleRow>>>,
    role_menus: Arc<RwLock<HashMap<(RoleId, i64), RoleMenuRow>>>,
    /// Accounts keyed by `(user_type, id)`; admin and member ids may collide.
    accounts: Arc<RwLock<HashMap<(i32, UserId), Account>>>,
    revoked_tokens: Arc<RwLock<HashMap<String, i64>>>,
    tables: Arc<RwLock<HashMap<String, TableData>>>,
}

impl InMemoryStore {
    /// Empty store with the login-log table registered.
    pub fn new() -> Self {
        let store = Self::default();
        if let Ok(mut tables) = store.tables.try_write() {
            let schema = login_log_schema();
            tables.insert(schema.name.clone(), TableData::new(schema));
        }
        store
    }

    pub async fn put_role(&self, row: RoleRow) {
        self.roles.write().await.insert(row.id, row);
    }

    pub async fn put_menu(&self, row: MenuRow) {
        self.menus.write().await.insert(row.id, row);
    }

    pub async fn put_user_role(&self, row: UserRoleRow) {
        self.user_roles
            .write()
            .await
            .insert((row.user_id, row.role_id), row);
    }

    pub async fn put_role_menu(&self, row: RoleMenuRow) {
        self.role_menus
            .write()
            .await
            .insert((row.role_id, row.menu_id), row);
    }

    pub async fn put_account(&self, account: Account) {
        self.accounts
            .write()
            .await
            .insert((account.user_type, account.id), account);
    }

    /// Register (or replace) a table for the generic row API.
    pub async fn register_table(&self, schema: TableSchema) {
        self.tables
            .write()
            .await
            .insert(schema.name.clone(), TableData::new(schema));
    }

    /// Rows of `table` without tenant filtering, for assertions.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|data| data.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PolicySource for InMemoryStore {
    async fn role_grants(&self, ctx: &RequestContext) -> StoreResult<Vec<RoleGrantRow>> {
        cancellable(ctx, async {
            let roles = self.roles.read().await;
            let menus = self.menus.read().await;
            let role_menus = self.role_menus.read().await;
            let mut grants = BTreeSet::new();
            for link in role_menus.values().filter(|link| !link.deleted) {
                let role_live = roles
                    .get(&link.role_id)
                    .map(|role| !role.deleted)
                    .unwrap_or(false);
                if !role_live {
                    continue;
                }
                let Some(menu) = menus.get(&link.menu_id) else {
                    continue;
                };
                if menu.deleted || menu.permission.is_empty() {
                    continue;
                }
                grants.insert(RoleGrantRow {
                    role_id: link.role_id,
                    permission: menu.permission.clone(),
                });
            }
            Ok(grants.into_iter().collect())
        })
        .await
    }

    async fn user_assignments(
        &self,
        ctx: &RequestContext,
    ) -> StoreResult<Vec<(UserId, RoleId)>> {
        cancellable(ctx, async {
            let roles = self.roles.read().await;
            let user_roles = self.user_roles.read().await;
            let mut assignments: Vec<(UserId, RoleId)> = user_roles
                .values()
                .filter(|link| !link.deleted)
                .filter(|link| {
                    roles
                        .get(&link.role_id)
                        .map(|role| !role.deleted)
                        .unwrap_or(false)
                })
                .map(|link| (link.user_id, link.role_id))
                .collect();
            assignments.sort();
            Ok(assignments)
        })
        .await
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn find_account(
        &self,
        ctx: &RequestContext,
        user_type: i32,
        user_id: UserId,
    ) -> StoreResult<Option<Account>> {
        cancellable(ctx, async {
            if user_type != USER_TYPE_ADMIN && user_type != USER_TYPE_MEMBER {
                return Ok(None);
            }
            Ok(self.accounts.read().await.get(&(user_type, user_id)).cloned())
        })
        .await
    }

    async fn role_ids_for_user(
        &self,
        ctx: &RequestContext,
        user_id: UserId,
        tenant_id: TenantId,
    ) -> StoreResult<Vec<RoleId>> {
        cancellable(ctx, async {
            let roles = self.roles.read().await;
            let user_roles = self.user_roles.read().await;
            let mut ids: Vec<RoleId> = user_roles
                .values()
                .filter(|link| link.user_id == user_id && !link.deleted)
                .filter(|link| {
                    roles
                        .get(&link.role_id)
                        .map(|role| !role.deleted && role.tenant_id == tenant_id)
                        .unwrap_or(false)
                })
                .map(|link| link.role_id)
                .collect();
            ids.sort();
            Ok(ids)
        })
        .await
    }

    async fn revoke_token(
        &self,
        ctx: &RequestContext,
        jti: &str,
        expires_at: i64,
    ) -> StoreResult<()> {
        cancellable(ctx, async {
            let now = chrono::Utc::now().timestamp();
            let mut revoked = self.revoked_tokens.write().await;
            // Entries past their expiry can no longer match a valid token.
            revoked.retain(|_, expiry| *expiry > now);
            revoked.insert(jti.to_string(), expires_at);
            Ok(())
        })
        .await
    }

    async fn is_token_revoked(&self, ctx: &RequestContext, jti: &str) -> StoreResult<bool> {
        cancellable(ctx, async {
            Ok(self.revoked_tokens.read().await.contains_key(jti))
        })
        .await
    }
}

#[async_trait]
impl RowStore for InMemoryStore {
    async fn table_schema(&self, ctx: &RequestContext, table: &str) -> StoreResult<TableSchema> {
        cancellable(ctx, async {
            self.tables
                .read()
                .await
                .get(table)
                .map(|data| data.schema.clone())
                .ok_or_else(|| StoreError::NotFound(format!("table {table}")))
        })
        .await
    }

    async fn insert_row(
        &self,
        ctx: &RequestContext,
        schema: &TableSchema,
        mut row: Row,
    ) -> StoreResult<Row> {
        cancellable(ctx, async {
            let mut tables = self.tables.write().await;
            let data = tables
                .get_mut(&schema.name)
                .ok_or_else(|| StoreError::NotFound(format!("table {}", schema.name)))?;
            data.schema.retain_declared(&mut row);
            for column in &data.schema.columns {
                if row.contains_key(&column.name) {
                    continue;
                }
                if let Some(default) = &column.default {
                    row.insert(column.name.clone(), default.clone());
                }
            }
            let id = match row.get(COLUMN_ID).and_then(Value::as_i64) {
                Some(id) => {
                    if data
                        .rows
                        .iter()
                        .any(|existing| existing.get(COLUMN_ID).and_then(Value::as_i64) == Some(id))
                    {
                        return Err(StoreError::Conflict(format!(
                            "{} id {id} exists",
                            schema.name
                        )));
                    }
                    data.next_id = data.next_id.max(id + 1);
                    id
                }
                None => {
                    let id = data.next_id;
                    data.next_id += 1;
                    id
                }
            };
            row.insert(COLUMN_ID.to_string(), json!(id));
            for column in &data.schema.columns {
                if !column.nullable && !row.contains_key(&column.name) {
                    return Err(StoreError::Invalid(format!(
                        "column {} is required",
                        column.name
                    )));
                }
            }
            data.rows.push(row.clone());
            Ok(row)
        })
        .await
    }

    async fn update_row(
        &self,
        ctx: &RequestContext,
        schema: &TableSchema,
        id: i64,
        filter: &Row,
        mut patch: Row,
    ) -> StoreResult<Row> {
        cancellable(ctx, async {
            let mut tables = self.tables.write().await;
            let data = tables
                .get_mut(&schema.name)
                .ok_or_else(|| StoreError::NotFound(format!("table {}", schema.name)))?;
            data.schema.retain_declared(&mut patch);
            patch.remove(COLUMN_ID);
            let row = data
                .rows
                .iter_mut()
                .find(|row| {
                    row.get(COLUMN_ID).and_then(Value::as_i64) == Some(id)
                        && filter
                            .iter()
                            .all(|(column, value)| row.get(column) == Some(value))
                })
                .ok_or_else(|| StoreError::NotFound(format!("{} id {id}", schema.name)))?;
            row.extend(patch);
            Ok(row.clone())
        })
        .await
    }

    async fn select_rows(
        &self,
        ctx: &RequestContext,
        schema: &TableSchema,
        filter: &Row,
    ) -> StoreResult<Vec<Row>> {
        cancellable(ctx, async {
            let tables = self.tables.read().await;
            let data = tables
                .get(&schema.name)
                .ok_or_else(|| StoreError::NotFound(format!("table {}", schema.name)))?;
            Ok(data
                .rows
                .iter()
                .filter(|row| {
                    filter
                        .iter()
                        .all(|(column, value)| row.get(column) == Some(value))
                })
                .cloned()
                .collect())
        })
        .await
    }
}

#[async_trait]
impl AdminPlaneStore for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ACCOUNT_STATUS_ENABLED;
    use tokio_util::sync::CancellationToken;

    fn role(id: i64, tenant: i64, deleted: bool) -> RoleRow {
        RoleRow {
            id: RoleId::new(id),
            tenant_id: TenantId::new(tenant),
            deleted,
        }
    }

    fn menu(id: i64, permission: &str, deleted: bool) -> MenuRow {
        MenuRow {
            id,
            permission: permission.to_string(),
            deleted,
        }
    }

    fn role_menu(role_id: i64, menu_id: i64, deleted: bool) -> RoleMenuRow {
        RoleMenuRow {
            role_id: RoleId::new(role_id),
            menu_id,
            deleted,
        }
    }

    fn user_role(user_id: i64, role_id: i64, deleted: bool) -> UserRoleRow {
        UserRoleRow {
            user_id: UserId::new(user_id),
            role_id: RoleId::new(role_id),
            deleted,
        }
    }

    #[tokio::test]
    async fn role_grants_skip_deleted_rows_and_empty_permissions() {
        let store = InMemoryStore::new();
        store.put_role(role(10, 1, false)).await;
        store.put_role(role(11, 1, true)).await;
        store.put_menu(menu(100, "system:user:list", false)).await;
        store.put_menu(menu(101, "system:user:create", true)).await;
        store.put_menu(menu(200, "", false)).await;
        store.put_role_menu(role_menu(10, 100, false)).await;
        store.put_role_menu(role_menu(10, 101, false)).await;
        store.put_role_menu(role_menu(10, 200, false)).await;
        store.put_role_menu(role_menu(11, 100, false)).await;

        let grants = store
            .role_grants(&RequestContext::background())
            .await
            .expect("grants");
        assert_eq!(
            grants,
            vec![RoleGrantRow {
                role_id: RoleId::new(10),
                permission: "system:user:list".to_string(),
            }]
        );

        store.put_role_menu(role_menu(10, 100, true)).await;
        let grants = store
            .role_grants(&RequestContext::background())
            .await
            .expect("grants");
        assert!(grants.is_empty());
    }

    #[tokio::test]
    async fn role_grants_are_distinct_across_menus() {
        let store = InMemoryStore::new();
        store.put_role(role(10, 1, false)).await;
        store.put_menu(menu(100, "a", false)).await;
        store.put_menu(menu(101, "a", false)).await;
        store.put_role_menu(role_menu(10, 100, false)).await;
        store.put_role_menu(role_menu(10, 101, false)).await;
        let grants = store
            .role_grants(&RequestContext::background())
            .await
            .expect("grants");
        assert_eq!(grants.len(), 1);
    }

    #[tokio::test]
    async fn assignments_skip_deleted_links_and_roles() {
        let store = InMemoryStore::new();
        store.put_role(role(10, 1, false)).await;
        store.put_role(role(11, 1, true)).await;
        store.put_user_role(user_role(1, 10, false)).await;
        store.put_user_role(user_role(1, 11, false)).await;
        store.put_user_role(user_role(2, 10, true)).await;
        let assignments = store
            .user_assignments(&RequestContext::background())
            .await
            .expect("assignments");
        assert_eq!(assignments, vec![(UserId::new(1), RoleId::new(10))]);
    }

    #[tokio::test]
    async fn role_ids_are_scoped_to_tenant() {
        let store = InMemoryStore::new();
        store.put_role(role(10, 1, false)).await;
        store.put_role(role(20, 2, false)).await;
        store.put_user_role(user_role(1, 10, false)).await;
        store.put_user_role(user_role(1, 20, false)).await;
        let ids = store
            .role_ids_for_user(&RequestContext::background(), UserId::new(1), TenantId::new(1))
            .await
            .expect("roles");
        assert_eq!(ids, vec![RoleId::new(10)]);
    }

    #[tokio::test]
    async fn accounts_are_keyed_by_user_type() {
        let store = InMemoryStore::new();
        store
            .put_account(Account {
                id: UserId::new(1),
                user_type: USER_TYPE_ADMIN,
                tenant_id: TenantId::new(1),
                status: ACCOUNT_STATUS_ENABLED,
                deleted: false,
            })
            .await;
        let ctx = RequestContext::background();
        assert!(
            store
                .find_account(&ctx, USER_TYPE_ADMIN, UserId::new(1))
                .await
                .expect("find")
                .is_some()
        );
        assert!(
            store
                .find_account(&ctx, USER_TYPE_MEMBER, UserId::new(1))
                .await
                .expect("find")
                .is_none()
        );
        assert!(
            store
                .find_account(&ctx, 99, UserId::new(1))
                .await
                .expect("find")
                .is_none()
        );
    }

    #[tokio::test]
    async fn revoked_tokens_are_remembered() {
        let store = InMemoryStore::new();
        let ctx = RequestContext::background();
        let expiry = chrono::Utc::now().timestamp() + 60;
        assert!(!store.is_token_revoked(&ctx, "jti-1").await.expect("check"));
        store.revoke_token(&ctx, "jti-1", expiry).await.expect("revoke");
        assert!(store.is_token_revoked(&ctx, "jti-1").await.expect("check"));
    }

    #[tokio::test]
    async fn insert_applies_defaults_and_ids() {
        let store = InMemoryStore::new();
        let ctx = RequestContext::background();
        let schema = store
            .table_schema(&ctx, LOGIN_LOG_TABLE)
            .await
            .expect("schema");
        let mut row = Row::new();
        row.insert("log_type".to_string(), json!(2));
        row.insert("user_id".to_string(), json!(7));
        row.insert("user_type".to_string(), json!(USER_TYPE_ADMIN));
        row.insert("unknown".to_string(), json!("dropped"));
        let stored = store
            .insert_row(&ctx, &schema, row.clone())
            .await
            .expect("insert");
        assert_eq!(stored[COLUMN_ID], json!(1));
        assert_eq!(stored[COLUMN_CREATOR], json!(""));
        assert_eq!(stored[COLUMN_TENANT_ID], json!(0));
        assert!(!stored.contains_key("unknown"));

        let second = store.insert_row(&ctx, &schema, row).await.expect("insert");
        assert_eq!(second[COLUMN_ID], json!(2));
    }

    #[tokio::test]
    async fn insert_rejects_missing_required_columns() {
        let store = InMemoryStore::new();
        let ctx = RequestContext::background();
        let schema = login_log_schema();
        let err = store
            .insert_row(&ctx, &schema, Row::new())
            .await
            .expect_err("required");
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn update_and_select_rows() {
        let store = InMemoryStore::new();
        let ctx = RequestContext::background();
        let schema = login_log_schema();
        let mut row = Row::new();
        row.insert("log_type".to_string(), json!(1));
        row.insert("user_id".to_string(), json!(7));
        row.insert("user_type".to_string(), json!(USER_TYPE_ADMIN));
        let stored = store.insert_row(&ctx, &schema, row).await.expect("insert");
        let id = stored[COLUMN_ID].as_i64().expect("id");

        let mut patch = Row::new();
        patch.insert("result".to_string(), json!(1));
        let mut other_user = Row::new();
        other_user.insert("user_id".to_string(), json!(8));
        let err = store
            .update_row(&ctx, &schema, id, &other_user, patch.clone())
            .await
            .expect_err("filter excludes the row");
        assert!(matches!(err, StoreError::NotFound(_)));

        let mut same_user = Row::new();
        same_user.insert("user_id".to_string(), json!(7));
        let updated = store
            .update_row(&ctx, &schema, id, &same_user, patch)
            .await
            .expect("update");
        assert_eq!(updated["result"], json!(1));

        let mut filter = Row::new();
        filter.insert("result".to_string(), json!(1));
        let rows = store
            .select_rows(&ctx, &schema, &filter)
            .await
            .expect("select");
        assert_eq!(rows.len(), 1);

        let err = store
            .update_row(&ctx, &schema, 99, &Row::new(), Row::new())
            .await
            .expect_err("missing");
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancelled_context_aborts_queries() {
        let store = InMemoryStore::new();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = RequestContext::new(token);
        let err = store.role_grants(&ctx).await.expect_err("cancelled");
        assert!(matches!(err, StoreError::Cancelled));
    }
}
