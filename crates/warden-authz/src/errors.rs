use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthzError {
    #[error("invalid policy line: {0}")]
    InvalidPolicyLine(String),
    #[error("invalid subject: {0}")]
    InvalidSubject(String),
    #[error("empty permission for role {0}")]
    EmptyPermission(i64),
}

pub type AuthzResult<T> = Result<T, AuthzError>;
