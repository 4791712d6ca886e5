//! Admin-plane authentication and authorization modules.
//!
//! # Purpose
//! Groups access token minting/verification, identity resolution, route
//! guards, and RBAC enforcement.
pub mod access_token;
pub mod authenticate;
pub mod keys;
pub mod middleware;
pub mod rbac;
