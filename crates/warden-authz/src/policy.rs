//! Policy line primitives.
//!
//! # Purpose
//! Defines the two derived relations the enforcer consumes: `grant(role, object,
//! action)` and `assign(user, role)`, plus their canonical text encoding.
//!
//! # How it fits
//! The policy store adapter projects the relational tables into a [`PolicySet`];
//! the enforcer feeds its lines to Casbin and reads them back for rendering.
//!
//! # Key invariants
//! - Grant objects are never empty.
//! - A [`PolicySet`] is deduplicated and iterates in a stable order.
//! - `p, role:<id>, <object>, <action>` and `g, user:<id>, role:<id>` are the
//!   only encodings; parsing a rendered line recovers the same value.
//!
//! # Examples
//! ```rust
//! use warden_authz::{Grant, PolicyLine, RoleId};
//!
//! let line = PolicyLine::Grant(Grant::access(RoleId::new(10), "system:user:list"));
//! assert_eq!(line.to_string(), "p, role:10, system:user:list, access");
//! assert_eq!(line.to_string().parse::<PolicyLine>().unwrap(), line);
//! ```
//!
//! # Common pitfalls
//! - Objects are opaque strings; they may contain colons or commas and are
//!   compared byte for byte.
use crate::model::{ACTION_ACCESS, PolicyKind};
use crate::types::{ROLE_SUBJECT_PREFIX, USER_SUBJECT_PREFIX, parse_subject};
use crate::{AuthzError, AuthzResult, RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// `p` relation: members of `role` may perform `action` on `object`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub role: RoleId,
    pub object: String,
    pub action: String,
}

impl Grant {
    pub fn new(role: RoleId, object: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            role,
            object: object.into(),
            action: action.into(),
        }
    }

    /// Grant with the fixed `access` action.
    pub fn access(role: RoleId, object: impl Into<String>) -> Self {
        Self::new(role, object, ACTION_ACCESS)
    }
}

/// `g` relation: `user` directly holds `role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub user: UserId,
    pub role: RoleId,
}

impl Assignment {
    pub fn new(user: UserId, role: RoleId) -> Self {
        Self { user, role }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicyLine {
    Grant(Grant),
    Assign(Assignment),
}

impl PolicyLine {
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicyLine::Grant(_) => PolicyKind::Policy,
            PolicyLine::Assign(_) => PolicyKind::Grouping,
        }
    }

    pub fn parse(value: &str) -> AuthzResult<Self> {
        value.parse()
    }

    /// Rule fields as Casbin stores them, without the leading `p`/`g` token.
    pub fn rule(&self) -> Vec<String> {
        match self {
            PolicyLine::Grant(grant) => vec![
                grant.role.subject(),
                grant.object.clone(),
                grant.action.clone(),
            ],
            PolicyLine::Assign(assignment) => {
                vec![assignment.user.subject(), assignment.role.subject()]
            }
        }
    }

    /// Rebuild a line from Casbin rule fields. Objects are taken verbatim.
    ///
    /// # Errors
    /// - [`AuthzError::InvalidPolicyLine`] on a wrong field count.
    /// - [`AuthzError::InvalidSubject`] when a subject lacks its prefix.
    /// - [`AuthzError::EmptyPermission`] for a blank grant object.
    pub fn from_rule(kind: PolicyKind, fields: &[String]) -> AuthzResult<Self> {
        let invalid = || AuthzError::InvalidPolicyLine(format!("{kind}, {}", fields.join(", ")));
        match (kind, fields) {
            (PolicyKind::Policy, [subject, object, action]) => {
                let role = parse_subject(subject, ROLE_SUBJECT_PREFIX)
                    .ok_or_else(|| AuthzError::InvalidSubject(subject.clone()))?;
                if object.trim().is_empty() {
                    return Err(AuthzError::EmptyPermission(role));
                }
                if action.trim().is_empty() {
                    return Err(invalid());
                }
                Ok(PolicyLine::Grant(Grant::new(
                    RoleId::new(role),
                    object.as_str(),
                    action.as_str(),
                )))
            }
            (PolicyKind::Grouping, [user, role]) => {
                let user = parse_subject(user, USER_SUBJECT_PREFIX)
                    .ok_or_else(|| AuthzError::InvalidSubject(user.clone()))?;
                let role = parse_subject(role, ROLE_SUBJECT_PREFIX)
                    .ok_or_else(|| AuthzError::InvalidSubject(role.clone()))?;
                Ok(PolicyLine::Assign(Assignment::new(
                    UserId::new(user),
                    RoleId::new(role),
                )))
            }
            _ => Err(invalid()),
        }
    }
}

impl std::fmt::Display for PolicyLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyLine::Grant(grant) => write!(
                f,
                "{}, {}, {}, {}",
                PolicyKind::Policy,
                grant.role.subject(),
                grant.object,
                grant.action
            ),
            PolicyLine::Assign(assignment) => write!(
                f,
                "{}, {}, {}",
                PolicyKind::Grouping,
                assignment.user.subject(),
                assignment.role.subject()
            ),
        }
    }
}

impl std::str::FromStr for PolicyLine {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || AuthzError::InvalidPolicyLine(value.to_string());
        let (kind, rest) = value.split_once(',').ok_or_else(invalid)?;
        let kind: PolicyKind = kind.parse().map_err(|_| invalid())?;
        match kind {
            PolicyKind::Policy => {
                // Subject is the first field and action the last; the object keeps
                // whatever lies between them, commas included.
                let (subject, rest) = rest.split_once(',').ok_or_else(invalid)?;
                let (object, action) = rest.rsplit_once(',').ok_or_else(invalid)?;
                let role = parse_subject(subject, ROLE_SUBJECT_PREFIX)
                    .ok_or_else(|| AuthzError::InvalidSubject(subject.trim().to_string()))?;
                let object = object.trim();
                let action = action.trim();
                if object.is_empty() {
                    return Err(AuthzError::EmptyPermission(role));
                }
                if action.is_empty() {
                    return Err(invalid());
                }
                Ok(PolicyLine::Grant(Grant::new(
                    RoleId::new(role),
                    object,
                    action,
                )))
            }
            PolicyKind::Grouping => {
                let (user, role) = rest.split_once(',').ok_or_else(invalid)?;
                let user = parse_subject(user, USER_SUBJECT_PREFIX)
                    .ok_or_else(|| AuthzError::InvalidSubject(user.trim().to_string()))?;
                let role = parse_subject(role, ROLE_SUBJECT_PREFIX)
                    .ok_or_else(|| AuthzError::InvalidSubject(role.trim().to_string()))?;
                Ok(PolicyLine::Assign(Assignment::new(
                    UserId::new(user),
                    RoleId::new(role),
                )))
            }
        }
    }
}

/// Deduplicated, canonically ordered result of one adapter load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    grants: BTreeSet<Grant>,
    assignments: BTreeSet<Assignment>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a grant; returns `false` when it was already present.
    ///
    /// # Errors
    /// - [`AuthzError::EmptyPermission`] when the object is empty or blank.
    pub fn insert_grant(&mut self, grant: Grant) -> AuthzResult<bool> {
        if grant.object.trim().is_empty() {
            return Err(AuthzError::EmptyPermission(grant.role.get()));
        }
        Ok(self.grants.insert(grant))
    }

    pub fn insert_assignment(&mut self, assignment: Assignment) -> bool {
        self.assignments.insert(assignment)
    }

    pub fn insert_line(&mut self, line: PolicyLine) -> AuthzResult<bool> {
        match line {
            PolicyLine::Grant(grant) => self.insert_grant(grant),
            PolicyLine::Assign(assignment) => Ok(self.insert_assignment(assignment)),
        }
    }

    pub fn grants(&self) -> impl Iterator<Item = &Grant> {
        self.grants.iter()
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter()
    }

    pub fn grant_count(&self) -> usize {
        self.grants.len()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty() && self.assignments.is_empty()
    }

    /// All lines, `p` lines first, each group in canonical order.
    pub fn lines(&self) -> impl Iterator<Item = PolicyLine> + '_ {
        self.grants
            .iter()
            .cloned()
            .map(PolicyLine::Grant)
            .chain(self.assignments.iter().copied().map(PolicyLine::Assign))
    }

    /// Canonical listing of every line, one per row.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out
    }

    pub fn from_lines<I>(lines: I) -> AuthzResult<Self>
    where
        I: IntoIterator<Item = PolicyLine>,
    {
        let mut set = Self::new();
        for line in lines {
            set.insert_line(line)?;
        }
        Ok(set)
    }
}
