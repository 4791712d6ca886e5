//! Warden authorization primitives shared by the admin plane and its tests.
//!
//! # Purpose
//! Centralizes the Casbin RBAC model, the policy line grammar, and the caller
//! identity carried through a request.
//!
//! # How it fits
//! The admin plane projects role grants and user assignments from its store into
//! a [`PolicySet`], hands the lines to a Casbin enforcer built from
//! [`casbin_model`], and evaluates every protected route with the [`Identity`]
//! resolved from the caller's credential.
//!
//! # Key invariants
//! - Object and action compare by exact string equality.
//! - Role membership is one level deep; roles never inherit from roles.
//! - Grants never carry an empty permission string.
//!
//! # Examples
//! ```rust
//! use warden_authz::{Assignment, Grant, PolicyKind, PolicyLine, PolicySet, RoleId, UserId};
//!
//! let mut set = PolicySet::new();
//! set.insert_grant(Grant::access(RoleId::new(11), "a")).unwrap();
//! set.insert_assignment(Assignment::new(UserId::new(2), RoleId::new(11)));
//!
//! let rules: Vec<Vec<String>> = set.lines().map(|line| line.rule()).collect();
//! assert_eq!(rules[0], vec!["role:11", "a", "access"]);
//! assert_eq!(
//!     PolicyLine::from_rule(PolicyKind::Grouping, &rules[1]).unwrap(),
//!     PolicyLine::Assign(Assignment::new(UserId::new(2), RoleId::new(11)))
//! );
//! ```
//!
//! # Common pitfalls
//! - Permission strings look hierarchical (`system:user:list`) but are matched
//!   as opaque strings; `system:user:*` grants nothing beyond itself.

mod decision;
mod errors;
mod identity;
mod model;
mod policy;
mod types;

pub use decision::Decision;
pub use errors::{AuthzError, AuthzResult};
pub use identity::{Identity, USER_TYPE_ADMIN, USER_TYPE_MEMBER};
pub use model::{ACTION_ACCESS, MODEL_CONF, PolicyKind, casbin_model, model_string};
pub use policy::{Assignment, Grant, PolicyLine, PolicySet};
pub use types::{ROLE_SUBJECT_PREFIX, RoleId, TenantId, USER_SUBJECT_PREFIX, UserId};
