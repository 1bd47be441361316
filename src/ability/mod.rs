//! Role abilities.
//!
//! An [`Ability`] is the runtime evaluator for one role's grants. It answers
//! [`Ability::can`] by exact membership over `(action, subject)` pairs: there
//! is no wildcard matching and no hierarchy expansion. In particular
//! [`Action::Manage`] is an ordinary action value and never implies the
//! others.
//!
//! Abilities are built per request by [`AbilityFactory`] and discarded after
//! use.

mod factory;

pub use factory::AbilityFactory;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{AccessError, AccessResult};
use crate::roles::RoleId;

/// Verb half of a permission.
///
/// Stored grants and catalog entries carry actions as lowercase strings.
/// Values outside the standard vocabulary (UI-only features such as
/// `block`) are kept verbatim in [`Action::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Export,
    Import,
    Manage,
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Export => "export",
            Self::Import => "import",
            Self::Manage => "manage",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        match s {
            "create" => Self::Create,
            "read" => Self::Read,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "export" => Self::Export,
            "import" => Self::Import,
            "manage" => Self::Manage,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Action {
    fn from(s: String) -> Self {
        Action::from(s.as_str())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored `(action, subject)` pair owned by a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub action: Action,
    pub subject: String,
}

impl Grant {
    pub fn new(action: impl Into<Action>, subject: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            subject: subject.into(),
        }
    }
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.action, self.subject)
    }
}

/// Evaluator bound to one role's grants.
#[derive(Debug, Clone, Default)]
pub struct Ability {
    rules: Vec<Grant>,
}

impl Ability {
    /// Build an ability from an explicit rule list.
    pub fn from_grants(rules: Vec<Grant>) -> Self {
        Self { rules }
    }

    /// An ability that denies every check.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the role holds exactly `(action, subject)`.
    pub fn can(&self, action: &Action, subject: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.action == *action && rule.subject == subject)
    }

    /// Convenience form of [`Ability::can`] for a [`Grant`].
    pub fn allows(&self, grant: &Grant) -> bool {
        self.can(&grant.action, &grant.subject)
    }

    pub fn rules(&self) -> &[Grant] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Parse a role's persisted access list.
///
/// Accepts an already-structured JSON array, or a string holding the
/// JSON-encoded array (legacy double encoding). `null`, a missing value and
/// a blank string all yield an empty list. Anything else, including a string
/// that does not decode to a grant array, is a [`AccessError::DataIntegrity`]
/// failure.
pub fn parse_access(role_id: RoleId, access: Option<&Value>) -> AccessResult<Vec<Grant>> {
    let integrity = |reason: String| AccessError::DataIntegrity { role_id, reason };

    match access {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value @ Value::Array(_)) => {
            Vec::<Grant>::deserialize(value).map_err(|e| integrity(e.to_string()))
        }
        Some(Value::String(encoded)) => {
            if encoded.trim().is_empty() {
                return Ok(Vec::new());
            }
            match serde_json::from_str::<Value>(encoded) {
                Ok(Value::Null) => Ok(Vec::new()),
                Ok(inner @ Value::Array(_)) => {
                    Vec::<Grant>::deserialize(inner).map_err(|e| integrity(e.to_string()))
                }
                Ok(other) => Err(integrity(format!(
                    "encoded access decodes to {}, expected an array",
                    json_kind(&other)
                ))),
                Err(e) => Err(integrity(e.to_string())),
            }
        }
        Some(other) => Err(integrity(format!(
            "access is {}, expected an array or encoded array",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
