//! Audited data access.
//!
//! # Purpose
//! [`interceptor`] stamps attribution columns on every write; [`repository`]
//! is the data-access facade that runs those hooks and applies the tenant
//! filter on reads.
pub mod interceptor;
pub mod repository;

pub use interceptor::{AuditInterceptor, WriteHook};
pub use repository::Repository;
