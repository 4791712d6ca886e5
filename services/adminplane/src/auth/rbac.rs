//! RBAC module wiring.
//!
//! # Purpose
//! Exposes the read-only Casbin table adapter, the snapshot enforcer, and the
//! well-known permission strings bound to admin routes.
pub mod adapter;
pub mod enforcer;
pub mod permissions;

pub use warden_authz::MODEL_CONF;
