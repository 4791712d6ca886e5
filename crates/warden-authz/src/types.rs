//! Strongly typed identifiers for authz-related records.
//!
//! # Purpose
//! Wraps the numeric primary keys of users, roles, and tenants so they cannot
//! be swapped by accident when building policy lines or stamping audit columns.
//!
//! # How it fits
//! Policy lines, the policy snapshot, and the request identity all carry these
//! wrappers; storage rows convert to them at the adapter boundary.
//!
//! # Key invariants
//! - Each wrapper preserves the raw `i64` exactly.
//! - `Display` renders the bare decimal value (used for `creator`/`updater`).
//!
//! # Examples
//! ```rust
//! use warden_authz::{RoleId, UserId};
//!
//! let user = UserId::new(7);
//! let role = RoleId::new(10);
//! assert_eq!(user.to_string(), "7");
//! assert_eq!(role.get(), 10);
//! ```
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// User primary key (`system_users.id`).
    UserId
);
id_type!(
    /// Role primary key (`system_role.id`).
    RoleId
);
id_type!(
    /// Tenant primary key; every data row and user belongs to exactly one.
    TenantId
);

/// Prefix used for user subjects in grouping lines.
pub const USER_SUBJECT_PREFIX: &str = "user:";
/// Prefix used for role subjects in policy and grouping lines.
pub const ROLE_SUBJECT_PREFIX: &str = "role:";

impl UserId {
    /// Render the policy subject form `user:<id>`.
    pub fn subject(self) -> String {
        format!("{USER_SUBJECT_PREFIX}{}", self.0)
    }
}

impl RoleId {
    /// Render the policy subject form `role:<id>`.
    pub fn subject(self) -> String {
        format!("{ROLE_SUBJECT_PREFIX}{}", self.0)
    }
}

pub(crate) fn parse_subject(raw: &str, prefix: &str) -> Option<i64> {
    raw.trim().strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_render_decimal_and_subjects() {
        assert_eq!(UserId::new(7).to_string(), "7");
        assert_eq!(UserId::new(7).subject(), "user:7");
        assert_eq!(RoleId::new(-3).subject(), "role:-3");
        assert_eq!(TenantId::from(42).get(), 42);
    }

    #[test]
    fn subjects_parse_only_with_matching_prefix() {
        assert_eq!(parse_subject("user:12", USER_SUBJECT_PREFIX), Some(12));
        assert_eq!(parse_subject(" role:4 ", ROLE_SUBJECT_PREFIX), Some(4));
        assert_eq!(parse_subject("role:4", USER_SUBJECT_PREFIX), None);
        assert_eq!(parse_subject("role:abc", ROLE_SUBJECT_PREFIX), None);
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&TenantId::new(42)).expect("serialize");
        assert_eq!(json, "42");
    }
}
