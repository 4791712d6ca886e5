//! Admin-plane service library crate.
//!
//! # Purpose
//! Exposes the admin-plane API surface, identity propagation, RBAC
//! enforcement, audited data access, WebSocket session registry, configuration
//! and storage implementations for use by the binary and tests.
pub mod api;
pub mod app;
pub mod audit;
pub mod auth;
pub mod config;
pub mod context;
pub mod model;
pub mod observability;
pub mod store;
pub mod ws;
