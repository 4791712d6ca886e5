//! Admin-plane HTTP API module.
//!
//! # Purpose
//! Exposes route handler modules and the shared request/response types.
pub mod auth;
pub mod error;
pub mod openapi;
pub mod permission;
pub mod system;
pub mod types;
pub mod websocket;
