//! Permission strings bound to admin routes and effective-permission listing.
//!
//! # Purpose and responsibility
//! Names the objects the admin plane itself protects, and flattens a caller's
//! grants for the `/admin/permission/me` view.
//!
//! # Key invariants and assumptions
//! - These strings must match `system_menu.permission` rows exactly; matching
//!   is plain equality.
use super::enforcer::PolicyEnforcer;
use warden_authz::{ACTION_ACCESS, UserId};

/// Trigger a policy reload.
pub const PERMISSION_POLICY_RELOAD: &str = "system:permission:reload";
/// Push a message to connected sessions.
pub const PERMISSION_WEBSOCKET_SEND: &str = "infra:websocket:send";

/// Permission strings Casbin grants `user` in the current snapshot, sorted.
///
/// Returns an empty list while the enforcer is uninitialized.
pub fn effective_permissions(enforcer: &PolicyEnforcer, user: UserId) -> Vec<String> {
    match enforcer.snapshot() {
        Some(snapshot) => snapshot
            .permissions_for_user(user, ACTION_ACCESS)
            .into_iter()
            .collect(),
        None => Vec::new(),
    }
}
