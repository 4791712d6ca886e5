#![allow(dead_code)]

use adminplane::app::AppState;
use adminplane::auth::access_token::TokenService;
use adminplane::auth::keys::signing_keys_from_seed;
use adminplane::auth::rbac::permissions::{PERMISSION_POLICY_RELOAD, PERMISSION_WEBSOCKET_SEND};
use adminplane::model::{
    ACCOUNT_STATUS_DISABLED, ACCOUNT_STATUS_ENABLED, Account, MenuRow, RoleMenuRow, RoleRow,
    UserRoleRow,
};
use adminplane::store::memory::InMemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use warden_authz::{RoleId, TenantId, USER_TYPE_ADMIN, USER_TYPE_MEMBER, UserId};

pub const TENANT: i64 = 1;
/// Admin holding every guarded permission through role 1.
pub const SUPERVISOR: i64 = 100;
/// Admin with no roles.
pub const BYSTANDER: i64 = 101;
/// Member assigned role 1; user type alone keeps it out of guarded routes.
pub const MEMBER: i64 = 102;
/// Disabled admin.
pub const DISABLED: i64 = 103;

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn token_service() -> Arc<TokenService> {
    Arc::new(TokenService::new(
        signing_keys_from_seed([7u8; 32]),
        "warden",
        "warden-admin",
        0,
    ))
}

pub fn account(id: i64, user_type: i32, status: i32) -> Account {
    Account {
        id: UserId::new(id),
        user_type,
        tenant_id: TenantId::new(TENANT),
        status,
        deleted: false,
    }
}

pub async fn role(store: &InMemoryStore, id: i64) {
    store
        .put_role(RoleRow {
            id: RoleId::new(id),
            tenant_id: TenantId::new(TENANT),
            deleted: false,
        })
        .await;
}

pub async fn menu(store: &InMemoryStore, id: i64, permission: &str) {
    store
        .put_menu(MenuRow {
            id,
            permission: permission.to_string(),
            deleted: false,
        })
        .await;
}

pub async fn role_menu(store: &InMemoryStore, role_id: i64, menu_id: i64) {
    store
        .put_role_menu(RoleMenuRow {
            role_id: RoleId::new(role_id),
            menu_id,
            deleted: false,
        })
        .await;
}

pub async fn user_role(store: &InMemoryStore, user_id: i64, role_id: i64, deleted: bool) {
    store
        .put_user_role(UserRoleRow {
            user_id: UserId::new(user_id),
            role_id: RoleId::new(role_id),
            deleted,
        })
        .await;
}

/// Store seeded with the accounts above and role 1 granting both guarded
/// permissions.
pub async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    role(&store, 1).await;
    menu(&store, 1, PERMISSION_POLICY_RELOAD).await;
    menu(&store, 2, PERMISSION_WEBSOCKET_SEND).await;
    menu(&store, 3, "").await;
    for menu_id in [1, 2, 3] {
        role_menu(&store, 1, menu_id).await;
    }
    user_role(&store, SUPERVISOR, 1, false).await;
    user_role(&store, MEMBER, 1, false).await;

    store
        .put_account(account(SUPERVISOR, USER_TYPE_ADMIN, ACCOUNT_STATUS_ENABLED))
        .await;
    store
        .put_account(account(BYSTANDER, USER_TYPE_ADMIN, ACCOUNT_STATUS_ENABLED))
        .await;
    store
        .put_account(account(MEMBER, USER_TYPE_MEMBER, ACCOUNT_STATUS_ENABLED))
        .await;
    store
        .put_account(account(DISABLED, USER_TYPE_ADMIN, ACCOUNT_STATUS_DISABLED))
        .await;
    store
}

pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub tokens: Arc<TokenService>,
    pub state: AppState,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = seeded_store().await;
        let tokens = token_service();
        let state = AppState::load(store.clone(), tokens.clone(), CancellationToken::new())
            .await
            .expect("state");
        Self {
            store,
            tokens,
            state,
        }
    }

    pub fn token_for(&self, id: i64, user_type: i32) -> String {
        self.tokens
            .mint(
                &account(id, user_type, ACCOUNT_STATUS_ENABLED),
                Duration::from_secs(600),
            )
            .expect("mint")
    }
}
