//! Dynamic table schema and row shape used by the audited repository.
//!
//! # Purpose
//! Describes which columns a table declares so write hooks can decide what to
//! stamp. Rows are JSON objects keyed by column name.
//!
//! # Key invariants
//! - Column names are unique within a schema.
//! - Only names that pass [`TableSchema::is_valid_identifier`] reach SQL.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const COLUMN_ID: &str = "id";
pub const COLUMN_CREATOR: &str = "creator";
pub const COLUMN_UPDATER: &str = "updater";
pub const COLUMN_TENANT_ID: &str = "tenant_id";
pub const COLUMN_CREATE_TIME: &str = "create_time";
pub const COLUMN_UPDATE_TIME: &str = "update_time";

pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Int,
    Text,
    Bool,
    Timestamp,
    Json,
}

impl ColumnKind {
    /// Map an `information_schema.columns.data_type` value.
    pub fn from_sql_type(data_type: &str) -> Self {
        match data_type {
            "bigint" | "integer" | "smallint" => ColumnKind::Int,
            "boolean" => ColumnKind::Bool,
            "json" | "jsonb" => ColumnKind::Json,
            value if value.starts_with("timestamp") => ColumnKind::Timestamp,
            _ => ColumnKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// Value applied by the store when an insert omits the column.
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Drop keys that are not declared columns.
    pub fn retain_declared(&self, row: &mut Row) {
        row.retain(|key, _| self.has_column(key));
    }

    /// ASCII letters, digits and `_`, not starting with a digit.
    pub fn is_valid_identifier(value: &str) -> bool {
        let mut chars = value.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
            _ => return false,
        }
        chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    }
}
