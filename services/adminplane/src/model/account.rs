use serde::{Deserialize, Serialize};
use warden_authz::{TenantId, UserId};

pub const ACCOUNT_STATUS_ENABLED: i32 = 0;
pub const ACCOUNT_STATUS_DISABLED: i32 = 1;

/// User record as seen by authentication: admins live in `system_users`,
/// members in `member_user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub user_type: i32,
    pub tenant_id: TenantId,
    pub status: i32,
    pub deleted: bool,
}

impl Account {
    pub fn is_active(&self) -> bool {
        !self.deleted && self.status == ACCOUNT_STATUS_ENABLED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_authz::USER_TYPE_ADMIN;

    #[test]
    fn active_requires_enabled_and_not_deleted() {
        let mut account = Account {
            id: UserId::new(1),
            user_type: USER_TYPE_ADMIN,
            tenant_id: TenantId::new(1),
            status: ACCOUNT_STATUS_ENABLED,
            deleted: false,
        };
        assert!(account.is_active());
        account.status = ACCOUNT_STATUS_DISABLED;
        assert!(!account.is_active());
        account.status = ACCOUNT_STATUS_ENABLED;
        account.deleted = true;
        assert!(!account.is_active());
    }
}
