//! RBAC model definition.
//!
//! The model is fixed: a request is `(sub, obj, act)`, a user matches a policy
//! when one of its directly assigned roles is the policy subject, and object and
//! action compare by plain string equality. Role membership is one level deep
//! because the table adapter only ever emits `g, user:<id>, role:<id>`.
use casbin::DefaultModel;

/// Casbin model configuration evaluated by every enforcer the admin plane builds.
pub const MODEL_CONF: &str = include_str!("model.conf");

/// The only action emitted by the table adapter.
pub const ACTION_ACCESS: &str = "access";

pub fn model_string() -> &'static str {
    MODEL_CONF
}

/// Parse [`MODEL_CONF`] into a Casbin model.
///
/// # Errors
/// - Casbin model errors; the embedded text is fixed, so this only fails if
///   the file was edited into an invalid shape.
pub async fn casbin_model() -> casbin::Result<DefaultModel> {
    DefaultModel::from_str(MODEL_CONF).await
}

/// Policy line kinds, keyed by their leading token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// `p, sub, obj, act`
    Policy,
    /// `g, user, role`
    Grouping,
}

impl PolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Policy => "p",
            PolicyKind::Grouping => "g",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "p" => Ok(PolicyKind::Policy),
            "g" => Ok(PolicyKind::Grouping),
            _ => Err(()),
        }
    }
}
