//! Route authorization bindings.
//!
//! [`RouteBinder::bind`] is the single declaration point for protected
//! operations. One call registers the permission in the catalog, derives the
//! route path from the subject, maps the action kind to its HTTP verb and
//! attaches the policy requirement:
//!
//! | kind          | verb   | catalog | requirement |
//! |---------------|--------|---------|-------------|
//! | `create`      | POST   | yes     | yes         |
//! | `read`        | GET    | yes     | yes         |
//! | `update`      | PATCH  | yes     | yes         |
//! | `delete`      | DELETE | yes     | yes         |
//! | `public_get`  | GET    | no      | no          |
//! | `public_post` | POST   | no      | no          |
//!
//! [`router::AdminRouter`] turns bindings into an axum router.

pub mod router;

pub use router::AdminRouter;

use axum::http::Method;
use axum::routing::MethodFilter;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ability::Action;
use crate::catalog::{Permission, PermissionCatalog, category_of};
use crate::error::{AccessError, AccessResult};
use crate::policy::PolicyRequirement;

/// Kind of operation a route performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Create,
    Read,
    Update,
    Delete,
    PublicGet,
    PublicPost,
}

/// Returned by [`ActionKind::from_str`] for names outside the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownActionKind(pub String);

impl fmt::Display for UnknownActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action kind {:?}", self.0)
    }
}

impl std::error::Error for UnknownActionKind {}

impl FromStr for ActionKind {
    type Err = UnknownActionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "public_get" => Ok(Self::PublicGet),
            "public_post" => Ok(Self::PublicPost),
            other => Err(UnknownActionKind(other.to_string())),
        }
    }
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::PublicGet => "public_get",
            Self::PublicPost => "public_post",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Self::Create | Self::PublicPost => Method::POST,
            Self::Read | Self::PublicGet => Method::GET,
            Self::Update => Method::PATCH,
            Self::Delete => Method::DELETE,
        }
    }

    pub(crate) fn method_filter(&self) -> MethodFilter {
        match self {
            Self::Create | Self::PublicPost => MethodFilter::POST,
            Self::Read | Self::PublicGet => MethodFilter::GET,
            Self::Update => MethodFilter::PATCH,
            Self::Delete => MethodFilter::DELETE,
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Self::PublicGet | Self::PublicPost)
    }

    /// Permission action registered for this kind; `None` for public kinds.
    pub fn action(&self) -> Option<Action> {
        match self {
            Self::Create => Some(Action::Create),
            Self::Read => Some(Action::Read),
            Self::Update => Some(Action::Update),
            Self::Delete => Some(Action::Delete),
            Self::PublicGet | Self::PublicPost => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved route declaration.
#[derive(Debug, Clone)]
pub struct RouteBinding {
    pub kind: ActionKind,
    pub subject: String,
    pub description: String,
    /// Root catalog grouping, e.g. `banners` for `banners/:id`.
    pub category: String,
    /// Path relative to the category, always starting with `/`.
    pub path: String,
    /// `None` for public routes.
    pub requirement: Option<PolicyRequirement>,
}

impl RouteBinding {
    pub fn method(&self) -> Method {
        self.kind.method()
    }

    /// Absolute path: `/<category><path>`.
    pub fn full_path(&self) -> String {
        join_path(&self.category, &self.path)
    }
}

/// Absolute route path for a subject, e.g. `/banners/:id`.
pub fn route_path(subject: &str) -> String {
    let (category, path) = split_subject(subject);
    join_path(category, &path)
}

/// Route path with parameter names erased, e.g. `/banners/:` for
/// `/banners/:id`. Two paths with the same shape are the same route to the
/// router, whatever their parameters are called.
pub fn route_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.chars().next() {
            Some(':') => ":",
            Some('*') => "*",
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn join_path(category: &str, path: &str) -> String {
    if path == "/" {
        format!("/{category}")
    } else {
        format!("/{category}{path}")
    }
}

/// Split a subject into its catalog category and the route path below it.
pub fn split_subject(subject: &str) -> (&str, String) {
    let category = category_of(subject);
    let rest = subject
        .trim_start_matches('/')
        .strip_prefix(category)
        .unwrap_or_default()
        .trim_matches('/');

    if rest.is_empty() {
        (category, "/".to_string())
    } else {
        (category, format!("/{rest}"))
    }
}

/// Declares protected routes against a permission catalog.
#[derive(Debug, Clone)]
pub struct RouteBinder {
    catalog: Arc<PermissionCatalog>,
    strict_action_kinds: bool,
}

impl RouteBinder {
    /// With `strict_action_kinds` off, unknown kinds fall back to `read`/GET.
    pub fn new(catalog: Arc<PermissionCatalog>, strict_action_kinds: bool) -> Self {
        Self {
            catalog,
            strict_action_kinds,
        }
    }

    pub fn catalog(&self) -> &Arc<PermissionCatalog> {
        &self.catalog
    }

    /// Resolve an action kind by name.
    ///
    /// # Errors
    ///
    /// [`AccessError::InvalidBinding`] for unknown names in strict mode.
    pub fn resolve_kind(&self, subject: &str, kind: &str) -> AccessResult<ActionKind> {
        match kind.parse::<ActionKind>() {
            Ok(kind) => Ok(kind),
            Err(e) if self.strict_action_kinds => Err(AccessError::InvalidBinding {
                subject: subject.to_string(),
                reason: e.to_string(),
            }),
            Err(e) => {
                warn!(subject = %subject, error = %e, "Unknown action kind; falling back to read/GET");
                Ok(ActionKind::Read)
            }
        }
    }

    /// Bind a route by action-kind name with the default single-rule requirement.
    pub fn bind(&self, subject: &str, kind: &str, description: &str) -> AccessResult<RouteBinding> {
        let kind = self.resolve_kind(subject, kind)?;
        self.bind_kind(subject, kind, description)
    }

    /// Bind a route requiring exactly `{subject, kind}`.
    pub fn bind_kind(
        &self,
        subject: &str,
        kind: ActionKind,
        description: &str,
    ) -> AccessResult<RouteBinding> {
        let requirement = kind
            .action()
            .map(|action| PolicyRequirement::rule(action, subject));
        self.finish(subject, kind, description, requirement)
    }

    /// Bind a route with an explicit requirement.
    ///
    /// The permission is still registered as `{subject, kind}` so it shows up
    /// in the catalog; enforcement uses `requirement` instead.
    ///
    /// # Errors
    ///
    /// [`AccessError::InvalidBinding`] for public kinds (which carry no
    /// requirement) and for an empty requirement.
    pub fn bind_with(
        &self,
        subject: &str,
        kind: ActionKind,
        description: &str,
        requirement: PolicyRequirement,
    ) -> AccessResult<RouteBinding> {
        if kind.is_public() {
            return Err(AccessError::InvalidBinding {
                subject: subject.to_string(),
                reason: format!("{kind} routes cannot carry a requirement"),
            });
        }
        if requirement.is_empty() {
            return Err(AccessError::InvalidBinding {
                subject: subject.to_string(),
                reason: "requirement list is empty".to_string(),
            });
        }
        self.finish(subject, kind, description, Some(requirement))
    }

    fn finish(
        &self,
        subject: &str,
        kind: ActionKind,
        description: &str,
        requirement: Option<PolicyRequirement>,
    ) -> AccessResult<RouteBinding> {
        if let Some(action) = kind.action() {
            self.catalog
                .register(Permission::new(subject, action, description))?;
        }

        let (category, path) = split_subject(subject);
        debug!(
            subject = %subject,
            kind = %kind,
            method = %kind.method(),
            path = %path,
            "Route bound"
        );

        Ok(RouteBinding {
            kind,
            subject: subject.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            path,
            requirement,
        })
    }
}
