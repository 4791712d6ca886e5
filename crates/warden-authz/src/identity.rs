use crate::{RoleId, TenantId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tenant end user.
pub const USER_TYPE_MEMBER: i32 = 1;
/// Back-office administrator.
pub const USER_TYPE_ADMIN: i32 = 2;

/// Authenticated caller attributes.
///
/// Built once from a verified credential and then shared read-only for the rest
/// of the request. Timestamps are unix seconds taken from the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub user_type: i32,
    pub tenant_id: TenantId,
    pub role_ids: BTreeSet<RoleId>,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl Identity {
    pub fn new(user_id: UserId, user_type: i32, tenant_id: TenantId) -> Self {
        Self {
            user_id,
            user_type,
            tenant_id,
            role_ids: BTreeSet::new(),
            issued_at: 0,
            expires_at: 0,
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.role_ids = roles.into_iter().collect();
        self
    }

    pub fn with_validity(mut self, issued_at: i64, expires_at: i64) -> Self {
        self.issued_at = issued_at;
        self.expires_at = expires_at;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.user_type == USER_TYPE_ADMIN
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at != 0 && now >= self.expires_at
    }
}
