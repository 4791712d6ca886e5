//! Admin-plane data model module.
//!
//! # Purpose
//! Re-exports the authorization table rows, account records, and the dynamic
//! table schema used by the audited repository.
mod account;
mod rbac;
mod table;

pub use account::{ACCOUNT_STATUS_DISABLED, ACCOUNT_STATUS_ENABLED, Account};
pub use rbac::{MenuRow, RoleGrantRow, RoleMenuRow, RoleRow, UserRoleRow};
pub use table::{
    COLUMN_CREATE_TIME, COLUMN_CREATOR, COLUMN_ID, COLUMN_TENANT_ID, COLUMN_UPDATE_TIME,
    COLUMN_UPDATER, ColumnDef, ColumnKind, Row, TableSchema,
};
