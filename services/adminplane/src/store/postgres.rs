//! Postgres-backed implementation of the admin-plane store.
//!
//! # What this module is
//! Implements the store traits over the account, authorization and audit
//! tables using `sqlx`. The policy projection is a pair of joins; generic rows
//! for the audited repository go through dynamically built statements whose
//! identifiers come from `information_schema`.
//!
//! # Key invariants
//! - Soft-deleted rows (`deleted = TRUE`) never reach the policy projection or
//!   account resolution.
//! - Table and column names are checked with
//!   [`TableSchema::is_valid_identifier`] and must exist in the discovered
//!   schema before they are formatted into SQL. Values are always bound.
//! - Unique violations and serialization failures surface as
//!   [`StoreError::Conflict`]; the policy adapter retries those once.
//!
//! # Concurrency model
//! - `sqlx::PgPool` manages connections; pool sizing bounds DB concurrency.
//! - Discovered table schemas are cached behind a `std::sync::RwLock`, never
//!   held across `.await`.
//! - Every call races the request's cancellation token.
//!
//! # Operational notes
//! - Migrations run at startup via `sqlx::migrate!("./migrations")` so handlers
//!   can assume the schema exists.
//! - Connect and acquire timeouts are explicit.
//! - Database URLs may contain credentials; never log them.
use super::{
    AccountStore, AdminPlaneStore, PolicySource, RowStore, StoreError, StoreResult, cancellable,
};
use crate::config::PostgresConfig;
use crate::context::RequestContext;
use crate::model::{Account, COLUMN_ID, ColumnDef, ColumnKind, RoleGrantRow, Row, TableSchema};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;
use warden_authz::{RoleId, TenantId, USER_TYPE_ADMIN, USER_TYPE_MEMBER, UserId};

const ADMIN_USER_TABLE: &str = "system_users";
const MEMBER_USER_TABLE: &str = "member_user";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some("23505") => return StoreError::Conflict(db_err.message().to_string()),
                Some("40001") | Some("40P01") => {
                    return StoreError::Conflict(db_err.message().to_string());
                }
                Some("23502") | Some("22P02") | Some("23503") => {
                    return StoreError::Invalid(db_err.message().to_string());
                }
                _ => {}
            }
        }
        if matches!(err, sqlx::Error::RowNotFound) {
            return StoreError::NotFound("row".to_string());
        }
        StoreError::Unexpected(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

pub struct PostgresStore {
    pool: PgPool,
    schemas: RwLock<HashMap<String, TableSchema>>,
}

#[derive(FromRow)]
struct DbGrant {
    role_id: i64,
    permission: String,
}

#[derive(FromRow)]
struct DbAssignment {
    user_id: i64,
    role_id: i64,
}

#[derive(FromRow)]
struct DbAccount {
    id: i64,
    tenant_id: i64,
    status: i32,
    deleted: bool,
}

#[derive(FromRow)]
struct DbColumn {
    column_name: String,
    data_type: String,
    is_nullable: String,
}

#[derive(FromRow)]
struct DbJsonRow {
    row: Value,
}

impl PostgresStore {
    /// Connect, run migrations, and return a ready store.
    ///
    /// # Errors
    /// - Connection, migration, or pool setup failures.
    ///
    /// # Example
    /// ```rust,no_run
    /// use adminplane::config::PostgresConfig;
    /// use adminplane::store::postgres::PostgresStore;
    ///
    /// async fn open(pg: PostgresConfig) {
    ///     let _ = PostgresStore::connect(&pg).await;
    /// }
    /// ```
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let store = Self::connect_without_migrations(pg).await?;
        sqlx::migrate!("./migrations").run(&store.pool).await?;
        Ok(store)
    }

    /// Connect against a schema managed elsewhere.
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = tokio::time::timeout(
            Duration::from_millis(pg.connect_timeout_ms),
            PgPoolOptions::new()
                .max_connections(pg.max_connections)
                .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
                .connect_with(connect_options),
        )
        .await
        .map_err(|_| StoreError::Unexpected(anyhow!("postgres connect timed out")))??;
        Ok(Self {
            pool,
            schemas: RwLock::new(HashMap::new()),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn cached_schema(&self, table: &str) -> Option<TableSchema> {
        self.schemas
            .read()
            .ok()
            .and_then(|schemas| schemas.get(table).cloned())
    }

    async fn load_schema(&self, table: &str) -> StoreResult<TableSchema> {
        if !TableSchema::is_valid_identifier(table) {
            return Err(StoreError::Invalid(format!("invalid table name {table:?}")));
        }
        if let Some(schema) = self.cached_schema(table) {
            return Ok(schema);
        }
        let columns = sqlx::query_as::<_, DbColumn>(
            r#"SELECT column_name::TEXT AS column_name, data_type::TEXT AS data_type,
                      is_nullable::TEXT AS is_nullable
               FROM information_schema.columns
               WHERE table_schema = current_schema() AND table_name = $1
               ORDER BY ordinal_position"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        if columns.is_empty() {
            return Err(StoreError::NotFound(format!("table {table}")));
        }
        let schema = TableSchema::new(
            table,
            columns
                .into_iter()
                .filter(|column| TableSchema::is_valid_identifier(&column.column_name))
                .map(|column| {
                    let def =
                        ColumnDef::new(column.column_name, ColumnKind::from_sql_type(&column.data_type));
                    if column.is_nullable == "NO" {
                        def.not_null()
                    } else {
                        def
                    }
                })
                .collect(),
        );
        if let Ok(mut schemas) = self.schemas.write() {
            schemas.insert(table.to_string(), schema.clone());
        }
        Ok(schema)
    }

    async fn fetch_json_rows(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> StoreResult<Vec<Row>> {
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| DbJsonRow::from_row(&row).map_err(StoreError::from))
            .map(|row| row.and_then(|row| json_to_row(row.row)))
            .collect()
    }
}

/// Typed bind value for a generic column.
enum BindValue {
    Int(Option<i64>),
    Text(Option<String>),
    Bool(Option<bool>),
    Timestamp(Option<DateTime<Utc>>),
    Json(Option<sqlx::types::Json<Value>>),
}

fn bind_value(column: &ColumnDef, value: Value) -> StoreResult<BindValue> {
    let invalid = |value: &Value| {
        StoreError::Invalid(format!(
            "column {} expects {:?}, got {value}",
            column.name, column.kind
        ))
    };
    if value.is_null() {
        return Ok(match column.kind {
            ColumnKind::Int => BindValue::Int(None),
            ColumnKind::Text => BindValue::Text(None),
            ColumnKind::Bool => BindValue::Bool(None),
            ColumnKind::Timestamp => BindValue::Timestamp(None),
            ColumnKind::Json => BindValue::Json(None),
        });
    }
    Ok(match column.kind {
        ColumnKind::Int => BindValue::Int(Some(value.as_i64().ok_or_else(|| invalid(&value))?)),
        ColumnKind::Text => BindValue::Text(Some(match value {
            Value::String(text) => text,
            other => other.to_string(),
        })),
        ColumnKind::Bool => BindValue::Bool(Some(value.as_bool().ok_or_else(|| invalid(&value))?)),
        ColumnKind::Timestamp => {
            let parsed = value
                .as_str()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .ok_or_else(|| invalid(&value))?;
            BindValue::Timestamp(Some(parsed.with_timezone(&Utc)))
        }
        ColumnKind::Json => BindValue::Json(Some(sqlx::types::Json(value))),
    })
}

fn apply_bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: BindValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        BindValue::Int(value) => query.bind(value),
        BindValue::Text(value) => query.bind(value),
        BindValue::Bool(value) => query.bind(value),
        BindValue::Timestamp(value) => query.bind(value),
        BindValue::Json(value) => query.bind(value),
    }
}

/// Pair each declared column in `row` with its bind value.
/// Binds run `SET` values first, then the id, then the scope predicates.
/// An empty `SET` list reads the row back through the same predicates.
fn update_sql(
    table: &str,
    columns: &[(String, BindValue)],
    scope: &[(String, BindValue)],
) -> String {
    let id_index = columns.len() + 1;
    let mut predicates = vec![format!("t.id = ${id_index}")];
    predicates.extend(
        scope
            .iter()
            .enumerate()
            .map(|(index, (name, _))| format!("t.{name} = ${}", id_index + index + 1)),
    );
    let predicates = predicates.join(" AND ");
    if columns.is_empty() {
        return format!("SELECT to_jsonb(t) AS row FROM {table} AS t WHERE {predicates}");
    }
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(index, (name, _))| format!("{name} = ${}", index + 1))
        .collect();
    format!(
        "WITH updated AS (UPDATE {table} AS t SET {} WHERE {predicates} RETURNING t.*) \
         SELECT to_jsonb(updated) AS row FROM updated",
        assignments.join(", ")
    )
}

fn typed_columns(schema: &TableSchema, row: Row) -> StoreResult<Vec<(String, BindValue)>> {
    let mut out = Vec::with_capacity(row.len());
    for (name, value) in row {
        let column = schema
            .column(&name)
            .ok_or_else(|| StoreError::Invalid(format!("unknown column {name}")))?;
        if !TableSchema::is_valid_identifier(&column.name) {
            return Err(StoreError::Invalid(format!("invalid column name {name:?}")));
        }
        out.push((name, bind_value(column, value)?));
    }
    Ok(out)
}

fn json_to_row(value: Value) -> StoreResult<Row> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(StoreError::Unexpected(anyhow!(
            "expected a JSON object row, got {other}"
        ))),
    }
}

fn user_table(user_type: i32) -> Option<&'static str> {
    match user_type {
        USER_TYPE_ADMIN => Some(ADMIN_USER_TABLE),
        USER_TYPE_MEMBER => Some(MEMBER_USER_TABLE),
        _ => None,
    }
}

#[async_trait]
impl PolicySource for PostgresStore {
    async fn role_grants(&self, ctx: &RequestContext) -> StoreResult<Vec<RoleGrantRow>> {
        cancellable(ctx, async {
            let rows = sqlx::query_as::<_, DbGrant>(
                r#"SELECT DISTINCT rm.role_id, m.permission
                   FROM system_role_menu rm
                   JOIN system_role r ON r.id = rm.role_id AND NOT r.deleted
                   JOIN system_menu m ON m.id = rm.menu_id AND NOT m.deleted
                   WHERE NOT rm.deleted AND m.permission <> ''
                   ORDER BY rm.role_id, m.permission"#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|row| RoleGrantRow {
                    role_id: RoleId::new(row.role_id),
                    permission: row.permission,
                })
                .collect())
        })
        .await
    }

    async fn user_assignments(
        &self,
        ctx: &RequestContext,
    ) -> StoreResult<Vec<(UserId, RoleId)>> {
        cancellable(ctx, async {
            let rows = sqlx::query_as::<_, DbAssignment>(
                r#"SELECT DISTINCT ur.user_id, ur.role_id
                   FROM system_user_role ur
                   JOIN system_role r ON r.id = ur.role_id AND NOT r.deleted
                   WHERE NOT ur.deleted
                   ORDER BY ur.user_id, ur.role_id"#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|row| (UserId::new(row.user_id), RoleId::new(row.role_id)))
                .collect())
        })
        .await
    }
}

#[async_trait]
impl AccountStore for PostgresStore {
    async fn find_account(
        &self,
        ctx: &RequestContext,
        user_type: i32,
        user_id: UserId,
    ) -> StoreResult<Option<Account>> {
        let Some(table) = user_table(user_type) else {
            return Ok(None);
        };
        cancellable(ctx, async {
            // `table` comes from the fixed allowlist in `user_table`.
            let query = format!(
                "SELECT id, tenant_id, status::INT4 AS status, deleted FROM {table} WHERE id = $1"
            );
            let row = sqlx::query_as::<_, DbAccount>(&query)
                .bind(user_id.get())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|row| Account {
                id: UserId::new(row.id),
                user_type,
                tenant_id: TenantId::new(row.tenant_id),
                status: row.status,
                deleted: row.deleted,
            }))
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
            let rows: Vec<i64> = sqlx::query_scalar(
                r#"SELECT DISTINCT ur.role_id
                   FROM system_user_role ur
                   JOIN system_role r ON r.id = ur.role_id AND NOT r.deleted
                   WHERE ur.user_id = $1 AND r.tenant_id = $2 AND NOT ur.deleted
                   ORDER BY ur.role_id"#,
            )
            .bind(user_id.get())
            .bind(tenant_id.get())
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(RoleId::new).collect())
        })
        .await
    }

    async fn revoke_token(
        &self,
        ctx: &RequestContext,
        jti: &str,
        expires_at: i64,
    ) -> StoreResult<()> {
        let expires_at = DateTime::<Utc>::from_timestamp(expires_at, 0)
            .ok_or_else(|| StoreError::Invalid(format!("expiry out of range: {expires_at}")))?;
        cancellable(ctx, async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM system_revoked_token WHERE expires_at < now()")
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                r#"INSERT INTO system_revoked_token (jti, expires_at) VALUES ($1, $2)
                   ON CONFLICT (jti) DO NOTHING"#,
            )
            .bind(jti)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn is_token_revoked(&self, ctx: &RequestContext, jti: &str) -> StoreResult<bool> {
        cancellable(ctx, async {
            let revoked: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM system_revoked_token WHERE jti = $1)",
            )
            .bind(jti)
            .fetch_one(&self.pool)
            .await?;
            Ok(revoked)
        })
        .await
    }
}

#[async_trait]
impl RowStore for PostgresStore {
    async fn table_schema(&self, ctx: &RequestContext, table: &str) -> StoreResult<TableSchema> {
        cancellable(ctx, self.load_schema(table)).await
    }

    async fn insert_row(
        &self,
        ctx: &RequestContext,
        schema: &TableSchema,
        mut row: Row,
    ) -> StoreResult<Row> {
        schema.retain_declared(&mut row);
        let columns = typed_columns(schema, row)?;
        let table = &schema.name;
        let sql = if columns.is_empty() {
            format!(
                "WITH inserted AS (INSERT INTO {table} DEFAULT VALUES RETURNING *) \
                 SELECT to_jsonb(inserted) AS row FROM inserted"
            )
        } else {
            let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|index| format!("${index}")).collect();
            format!(
                "WITH inserted AS (INSERT INTO {table} ({}) VALUES ({}) RETURNING *) \
                 SELECT to_jsonb(inserted) AS row FROM inserted",
                names.join(", "),
                placeholders.join(", ")
            )
        };
        cancellable(ctx, async {
            let mut query = sqlx::query(&sql);
            for (_, value) in columns {
                query = apply_bind(query, value);
            }
            self.fetch_json_rows(query)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::Unexpected(anyhow!("insert returned no row")))
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
        schema.retain_declared(&mut patch);
        patch.remove(COLUMN_ID);
        let columns = typed_columns(schema, patch)?;
        let mut scope = filter.clone();
        scope.remove(COLUMN_ID);
        let scope = typed_columns(schema, scope)?;
        let table = &schema.name;
        let sql = update_sql(table, &columns, &scope);
        cancellable(ctx, async {
            let mut query = sqlx::query(&sql);
            for (_, value) in columns {
                query = apply_bind(query, value);
            }
            query = query.bind(id);
            for (_, value) in scope {
                query = apply_bind(query, value);
            }
            self.fetch_json_rows(query)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::NotFound(format!("{table} id {id}")))
        })
        .await
    }

    async fn select_rows(
        &self,
        ctx: &RequestContext,
        schema: &TableSchema,
        filter: &Row,
    ) -> StoreResult<Vec<Row>> {
        let columns = typed_columns(schema, filter.clone())?;
        let table = &schema.name;
        let mut sql = format!("SELECT to_jsonb(t) AS row FROM {table} AS t");
        if !columns.is_empty() {
            let predicates: Vec<String> = columns
                .iter()
                .enumerate()
                .map(|(index, (name, _))| format!("t.{name} = ${}", index + 1))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        if schema.has_column(COLUMN_ID) {
            sql.push_str(" ORDER BY t.id");
        }
        cancellable(ctx, async {
            let mut query = sqlx::query(&sql);
            for (_, value) in columns {
                query = apply_bind(query, value);
            }
            self.fetch_json_rows(query).await
        })
        .await
    }
}

#[async_trait]
impl AdminPlaneStore for PostgresStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
