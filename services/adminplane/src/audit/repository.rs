//! Audited data-access facade over a [`RowStore`].
//!
//! # Key invariants
//! - Every insert and update passes through the registered [`WriteHook`]s
//!   before reaching the store.
//! - `creator`, `tenant_id` and `id` are never rewritten by an update.
//! - Reads and updates of tables declaring `tenant_id` are restricted to the
//!   caller's tenant when an identity is present; an update aimed at another
//!   tenant's row fails with `NotFound`.
use super::interceptor::{AuditInterceptor, WriteHook};
use crate::context::RequestContext;
use crate::model::{COLUMN_CREATOR, COLUMN_ID, COLUMN_TENANT_ID, Row, TableSchema};
use crate::store::{RowStore, StoreResult};
use serde_json::json;
use std::sync::Arc;

pub struct Repository {
    store: Arc<dyn RowStore>,
    hooks: Vec<Arc<dyn WriteHook>>,
}

impl Repository {
    /// Repository with the [`AuditInterceptor`] installed.
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self {
            store,
            hooks: vec![Arc::new(AuditInterceptor::new())],
        }
    }

    /// Append a hook; hooks run in registration order.
    pub fn with_hook(mut self, hook: Arc<dyn WriteHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub async fn schema(&self, ctx: &RequestContext, table: &str) -> StoreResult<TableSchema> {
        self.store.table_schema(ctx, table).await
    }

    pub async fn insert(&self, ctx: &RequestContext, table: &str, mut row: Row) -> StoreResult<Row> {
        let schema = self.schema(ctx, table).await?;
        for hook in &self.hooks {
            hook.before_insert(ctx, &schema, &mut row);
        }
        self.store.insert_row(ctx, &schema, row).await
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        table: &str,
        id: i64,
        mut patch: Row,
    ) -> StoreResult<Row> {
        let schema = self.schema(ctx, table).await?;
        for column in [COLUMN_ID, COLUMN_CREATOR, COLUMN_TENANT_ID] {
            patch.remove(column);
        }
        for hook in &self.hooks {
            hook.before_update(ctx, &schema, &mut patch);
        }
        // Hooks may only stamp update-side columns.
        patch.remove(COLUMN_CREATOR);
        patch.remove(COLUMN_TENANT_ID);
        let mut scope = Row::new();
        scope_to_tenant(ctx, &schema, &mut scope);
        self.store.update_row(ctx, &schema, id, &scope, patch).await
    }

    /// Rows matching `filter`, limited to the caller's tenant.
    pub async fn select(
        &self,
        ctx: &RequestContext,
        table: &str,
        mut filter: Row,
    ) -> StoreResult<Vec<Row>> {
        let schema = self.schema(ctx, table).await?;
        scope_to_tenant(ctx, &schema, &mut filter);
        self.store.select_rows(ctx, &schema, &filter).await
    }
}

fn scope_to_tenant(ctx: &RequestContext, schema: &TableSchema, filter: &mut Row) {
    if schema.has_column(COLUMN_TENANT_ID)
        && let Some(identity) = ctx.identity()
    {
        filter.insert(
            COLUMN_TENANT_ID.to_string(),
            json!(identity.tenant_id.get()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{COLUMN_UPDATER, ColumnDef, ColumnKind};
    use crate::store::StoreError;
    use crate::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_authz::{Identity, TenantId, USER_TYPE_ADMIN, UserId};

    fn notes_schema() -> TableSchema {
        TableSchema::new(
            "notes",
            vec![
                ColumnDef::new(COLUMN_ID, ColumnKind::Int).not_null(),
                ColumnDef::new("body", ColumnKind::Text),
                ColumnDef::new(COLUMN_CREATOR, ColumnKind::Text).with_default(json!("")),
                ColumnDef::new(COLUMN_UPDATER, ColumnKind::Text).with_default(json!("")),
                ColumnDef::new(COLUMN_TENANT_ID, ColumnKind::Int).with_default(json!(0)),
            ],
        )
    }

    fn as_user(user: i64, tenant: i64) -> RequestContext {
        RequestContext::background().with_identity(Arc::new(Identity::new(
            UserId::new(user),
            USER_TYPE_ADMIN,
            TenantId::new(tenant),
        )))
    }

    async fn repository() -> Repository {
        let store = Arc::new(InMemoryStore::new());
        store.register_table(notes_schema()).await;
        Repository::new(store)
    }

    fn body(text: &str) -> Row {
        Row::from([("body".to_string(), json!(text))])
    }

    #[tokio::test]
    async fn update_never_rewrites_creator_or_tenant() {
        let repo = repository().await;
        let inserted = repo
            .insert(&as_user(7, 42), "notes", body("a"))
            .await
            .expect("insert");
        let id = inserted.get(COLUMN_ID).and_then(|v| v.as_i64()).expect("id");

        let mut patch = body("b");
        patch.insert(COLUMN_CREATOR.to_string(), json!("99"));
        patch.insert(COLUMN_TENANT_ID.to_string(), json!(1));
        let updated = repo
            .update(&as_user(8, 42), "notes", id, patch)
            .await
            .expect("update");
        assert_eq!(updated.get(COLUMN_CREATOR), Some(&json!("7")));
        assert_eq!(updated.get(COLUMN_UPDATER), Some(&json!("8")));
        assert_eq!(updated.get(COLUMN_TENANT_ID), Some(&json!(42)));
        assert_eq!(updated.get("body"), Some(&json!("b")));
    }

    #[tokio::test]
    async fn update_cannot_reach_another_tenants_row() {
        let repo = repository().await;
        let inserted = repo
            .insert(&as_user(7, 42), "notes", body("a"))
            .await
            .expect("insert");
        let id = inserted.get(COLUMN_ID).and_then(|v| v.as_i64()).expect("id");

        let err = repo
            .update(&as_user(9, 43), "notes", id, body("hijacked"))
            .await
            .expect_err("other tenant");
        assert!(matches!(err, StoreError::NotFound(_)));

        let rows = repo
            .select(&as_user(7, 42), "notes", Row::new())
            .await
            .expect("select");
        assert_eq!(rows[0].get("body"), Some(&json!("a")));
        assert_eq!(rows[0].get(COLUMN_UPDATER), Some(&json!("7")));

        let updated = repo
            .update(&RequestContext::background(), "notes", id, body("system"))
            .await
            .expect("unscoped update");
        assert_eq!(updated.get("body"), Some(&json!("system")));
    }

    #[tokio::test]
    async fn select_is_tenant_scoped() {
        let repo = repository().await;
        repo.insert(&as_user(7, 42), "notes", body("mine"))
            .await
            .expect("insert");
        repo.insert(&as_user(9, 43), "notes", body("theirs"))
            .await
            .expect("insert");

        let rows = repo
            .select(&as_user(7, 42), "notes", Row::new())
            .await
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("body"), Some(&json!("mine")));

        // Callers cannot widen the filter to another tenant.
        let mut filter = Row::new();
        filter.insert(COLUMN_TENANT_ID.to_string(), json!(43));
        let rows = repo
            .select(&as_user(7, 42), "notes", filter)
            .await
            .expect("select");
        assert!(rows.iter().all(|row| row.get(COLUMN_TENANT_ID) == Some(&json!(42))));

        let all = repo
            .select(&RequestContext::background(), "notes", Row::new())
            .await
            .expect("select");
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn extra_hooks_run_after_audit() {
        struct Counting(AtomicUsize);
        impl WriteHook for Counting {
            fn before_insert(&self, _: &RequestContext, _: &TableSchema, row: &mut Row) {
                assert_eq!(row.get(COLUMN_CREATOR), Some(&json!("7")));
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn before_update(&self, _: &RequestContext, _: &TableSchema, _: &mut Row) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let store = Arc::new(InMemoryStore::new());
        store.register_table(notes_schema()).await;
        let repo = Repository::new(store).with_hook(counter.clone());
        repo.insert(&as_user(7, 42), "notes", body("a"))
            .await
            .expect("insert");
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_table_is_not_found() {
        let repo = repository().await;
        let err = repo
            .insert(&as_user(7, 42), "missing", Row::new())
            .await
            .expect_err("missing table");
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
