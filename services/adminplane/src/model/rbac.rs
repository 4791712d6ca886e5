//! Rows of the four authorization tables.
//!
//! # Purpose
//! Mirrors `system_role`, `system_menu`, `system_user_role`, and
//! `system_role_menu` as read by the policy store adapter. Only the columns the
//! projection needs are modeled.
use serde::{Deserialize, Serialize};
use warden_authz::{RoleId, TenantId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRow {
    pub id: RoleId,
    pub tenant_id: TenantId,
    pub deleted: bool,
}

/// Menu entry; an empty `permission` marks a pure UI grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuRow {
    pub id: i64,
    pub permission: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleRow {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMenuRow {
    pub role_id: RoleId,
    pub menu_id: i64,
    pub deleted: bool,
}

/// One `(role, permission)` pair of the role ⋈ role_menu ⋈ menu projection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoleGrantRow {
    pub role_id: RoleId,
    pub permission: String,
}
