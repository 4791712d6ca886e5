//! Write hooks that stamp attribution columns.
//!
//! # Purpose and responsibility
//! Before a row reaches the store, [`AuditInterceptor`] fills `creator`,
//! `updater` and `tenant_id` from the request identity and the
//! `create_time`/`update_time` columns from the clock.
//!
//! # Key invariants and assumptions
//! - Only columns the table declares are touched.
//! - Identity-derived columns are written only when the context carries an
//!   identity; otherwise the row keeps its declared defaults.
//! - Hooks are infallible. A skipped stamp is logged, never an error.
//! - Stamped values replace whatever the caller put in those columns.
use crate::context::RequestContext;
use crate::model::{
    COLUMN_CREATE_TIME, COLUMN_CREATOR, COLUMN_TENANT_ID, COLUMN_UPDATE_TIME, COLUMN_UPDATER, Row,
    TableSchema,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};

/// Hook invoked by the repository before each write.
pub trait WriteHook: Send + Sync {
    fn before_insert(&self, ctx: &RequestContext, schema: &TableSchema, row: &mut Row);
    fn before_update(&self, ctx: &RequestContext, schema: &TableSchema, patch: &mut Row);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AuditInterceptor;

impl AuditInterceptor {
    pub fn new() -> Self {
        Self
    }
}

fn now_value() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn stamp(schema: &TableSchema, row: &mut Row, column: &str, value: Value) -> bool {
    if !schema.has_column(column) {
        return false;
    }
    row.insert(column.to_string(), value);
    true
}

impl WriteHook for AuditInterceptor {
    fn before_insert(&self, ctx: &RequestContext, schema: &TableSchema, row: &mut Row) {
        let now = now_value();
        stamp(schema, row, COLUMN_CREATE_TIME, now.clone());
        stamp(schema, row, COLUMN_UPDATE_TIME, now);

        let Some(identity) = ctx.identity() else {
            tracing::debug!(table = %schema.name, "insert without identity; attribution skipped");
            return;
        };
        let user = json!(identity.user_id.to_string());
        let mut stamped = stamp(schema, row, COLUMN_CREATOR, user.clone());
        stamped |= stamp(schema, row, COLUMN_UPDATER, user);
        stamped |= stamp(
            schema,
            row,
            COLUMN_TENANT_ID,
            json!(identity.tenant_id.get()),
        );
        if stamped {
            metrics::counter!("warden_audit_stamps_total", "op" => "insert").increment(1);
        }
    }

    fn before_update(&self, ctx: &RequestContext, schema: &TableSchema, patch: &mut Row) {
        stamp(schema, patch, COLUMN_UPDATE_TIME, now_value());

        let Some(identity) = ctx.identity() else {
            tracing::debug!(table = %schema.name, "update without identity; attribution skipped");
            return;
        };
        if stamp(
            schema,
            patch,
            COLUMN_UPDATER,
            json!(identity.user_id.to_string()),
        ) {
            metrics::counter!("warden_audit_stamps_total", "op" => "update").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{COLUMN_ID, ColumnDef, ColumnKind};
    use std::sync::Arc;
    use warden_authz::{Identity, TenantId, USER_TYPE_ADMIN, UserId};

    fn schema(columns: &[&str]) -> TableSchema {
        let mut defs = vec![ColumnDef::new(COLUMN_ID, ColumnKind::Int)];
        defs.extend(
            columns
                .iter()
                .map(|name| ColumnDef::new(*name, ColumnKind::Text)),
        );
        TableSchema::new("t", defs)
    }

    fn ctx() -> RequestContext {
        RequestContext::background().with_identity(Arc::new(Identity::new(
            UserId::new(7),
            USER_TYPE_ADMIN,
            TenantId::new(42),
        )))
    }

    #[test]
    fn insert_stamps_declared_columns() {
        let schema = schema(&[COLUMN_CREATOR, COLUMN_UPDATER, COLUMN_TENANT_ID]);
        let mut row = Row::new();
        AuditInterceptor::new().before_insert(&ctx(), &schema, &mut row);
        assert_eq!(row.get(COLUMN_CREATOR), Some(&json!("7")));
        assert_eq!(row.get(COLUMN_UPDATER), Some(&json!("7")));
        assert_eq!(row.get(COLUMN_TENANT_ID), Some(&json!(42)));
        assert!(!row.contains_key(COLUMN_CREATE_TIME));
    }

    #[test]
    fn undeclared_columns_are_untouched() {
        let schema = schema(&["name"]);
        let mut row = Row::new();
        row.insert("name".to_string(), json!("x"));
        AuditInterceptor::new().before_insert(&ctx(), &schema, &mut row);
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn missing_identity_skips_attribution_but_keeps_timestamps() {
        let schema = schema(&[COLUMN_CREATOR, COLUMN_TENANT_ID, COLUMN_CREATE_TIME]);
        let mut row = Row::new();
        AuditInterceptor::new().before_insert(&RequestContext::background(), &schema, &mut row);
        assert!(!row.contains_key(COLUMN_CREATOR));
        assert!(!row.contains_key(COLUMN_TENANT_ID));
        let stamped = row
            .get(COLUMN_CREATE_TIME)
            .and_then(Value::as_str)
            .expect("create_time");
        chrono::DateTime::parse_from_rfc3339(stamped).expect("rfc3339");
    }

    #[test]
    fn update_sets_updater_only() {
        let schema = schema(&[COLUMN_CREATOR, COLUMN_UPDATER, COLUMN_TENANT_ID, COLUMN_UPDATE_TIME]);
        let mut patch = Row::new();
        AuditInterceptor::new().before_update(&ctx(), &schema, &mut patch);
        assert_eq!(patch.get(COLUMN_UPDATER), Some(&json!("7")));
        assert!(patch.contains_key(COLUMN_UPDATE_TIME));
        assert!(!patch.contains_key(COLUMN_CREATOR));
        assert!(!patch.contains_key(COLUMN_TENANT_ID));
    }

    #[test]
    fn caller_values_are_overwritten() {
        let schema = schema(&[COLUMN_CREATOR]);
        let mut row = Row::new();
        row.insert(COLUMN_CREATOR.to_string(), json!("spoofed"));
        AuditInterceptor::new().before_insert(&ctx(), &schema, &mut row);
        assert_eq!(row.get(COLUMN_CREATOR), Some(&json!("7")));
    }
}
