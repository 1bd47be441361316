//! Request-time policy evaluation.
//!
//! Every protected operation carries one [`PolicyRequirement`], chosen when
//! the route is bound:
//!
//! - [`PolicyRequirement::Declarative`]: `(action, subject)` rules, satisfied
//!   when **any** rule is granted.
//! - [`PolicyRequirement::Predicate`]: checks over the [`Ability`], satisfied
//!   only when **all** of them pass.
//!
//! The two shapes are separate variants, so a requirement mixing them cannot
//! be expressed.
//!
//! [`PolicyEvaluator::authorize`] resolves the principal's ability and
//! returns the decision together with the UI-only features the ability
//! enables. Nothing is written into shared request state here; the transport
//! adapter decides where the features go.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info};

use crate::ability::{Ability, AbilityFactory, Action, Grant};
use crate::error::{AccessError, AccessResult};
use crate::roles::{RoleId, RoleStore};

/// Authenticated identity attached to a request by upstream authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role_id: RoleId,
    #[serde(default)]
    pub role_name: Option<String>,
    /// Remaining identity claims, carried through untouched.
    #[serde(default, flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl Principal {
    pub fn new(id: impl Into<String>, role_id: RoleId) -> Self {
        Self {
            id: id.into(),
            role_id,
            role_name: None,
            claims: serde_json::Map::new(),
        }
    }
}

/// A named check over an [`Ability`].
#[derive(Clone)]
pub struct Predicate {
    name: String,
    check: Arc<dyn Fn(&Ability) -> bool + Send + Sync>,
}

impl Predicate {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Ability) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Predicate requiring one exact `(action, subject)` grant.
    pub fn can(action: impl Into<Action>, subject: impl Into<String>) -> Self {
        let grant = Grant::new(action, subject);
        Self::new(format!("can({grant})"), move |ability| ability.allows(&grant))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn test(&self, ability: &Ability) -> bool {
        (self.check)(ability)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.name).finish()
    }
}

/// The condition an operation demands before allowing access.
#[derive(Debug, Clone)]
pub enum PolicyRequirement {
    /// Satisfied if any rule is granted.
    Declarative(Vec<Grant>),
    /// Satisfied only if every predicate passes.
    Predicate(Vec<Predicate>),
}

impl PolicyRequirement {
    /// Single-rule declarative requirement.
    pub fn rule(action: impl Into<Action>, subject: impl Into<String>) -> Self {
        Self::Declarative(vec![Grant::new(action, subject)])
    }

    pub fn any_of(rules: impl IntoIterator<Item = Grant>) -> Self {
        Self::Declarative(rules.into_iter().collect())
    }

    pub fn all_of(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::Predicate(predicates.into_iter().collect())
    }

    /// Whether `ability` satisfies this requirement. Never fails.
    pub fn is_satisfied_by(&self, ability: &Ability) -> bool {
        match self {
            Self::Declarative(rules) => rules.iter().any(|rule| ability.allows(rule)),
            Self::Predicate(predicates) => predicates.iter().all(|p| p.test(ability)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Declarative(rules) => rules.is_empty(),
            Self::Predicate(predicates) => predicates.is_empty(),
        }
    }
}

/// UI-only grants enabled for the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnabledFeatures(Vec<Grant>);

impl EnabledFeatures {
    pub fn contains(&self, action: &Action, subject: &str) -> bool {
        self.0
            .iter()
            .any(|g| g.action == *action && g.subject == subject)
    }

    pub fn grants(&self) -> &[Grant] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome of evaluating a requirement against an ability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub enabled_features: EnabledFeatures,
}

/// A successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub principal_id: String,
    pub enabled_features: EnabledFeatures,
}

/// Per-request gate resolving requirements against a principal's ability.
pub struct PolicyEvaluator<S> {
    factory: AbilityFactory<S>,
    feature_allowlist: Vec<Grant>,
}

impl<S: RoleStore> PolicyEvaluator<S> {
    /// `feature_allowlist` is the fixed set of UI-only grants reported back
    /// when an ability holds them.
    pub fn new(factory: AbilityFactory<S>, feature_allowlist: Vec<Grant>) -> Self {
        Self {
            factory,
            feature_allowlist,
        }
    }

    pub fn factory(&self) -> &AbilityFactory<S> {
        &self.factory
    }

    pub fn feature_allowlist(&self) -> &[Grant] {
        &self.feature_allowlist
    }

    /// Evaluate `requirement` against an already-built ability.
    pub fn evaluate(&self, ability: &Ability, requirement: &PolicyRequirement) -> Decision {
        if !requirement.is_satisfied_by(ability) {
            return Decision {
                allowed: false,
                enabled_features: EnabledFeatures::default(),
            };
        }

        let enabled = self
            .feature_allowlist
            .iter()
            .filter(|g| ability.allows(g))
            .cloned()
            .collect();

        Decision {
            allowed: true,
            enabled_features: EnabledFeatures(enabled),
        }
    }

    /// Authorize `principal` for an operation on `resource`.
    ///
    /// # Errors
    ///
    /// - [`AccessError::Unauthenticated`] when there is no principal or its role is unknown
    /// - [`AccessError::Forbidden`] when the requirement is not met
    /// - [`AccessError::DataIntegrity`] / [`AccessError::RoleStore`] from ability construction
    pub async fn authorize(
        &self,
        principal: Option<&Principal>,
        requirement: &PolicyRequirement,
        resource: &str,
    ) -> AccessResult<Authorization> {
        let start = Instant::now();
        let span = crate::telemetry::spans::authorize(
            principal.map(|p| p.id.as_str()).unwrap_or("-"),
            resource,
        );

        let result = self
            .authorize_inner(principal, requirement, resource)
            .instrument(span)
            .await;

        let outcome = match &result {
            Ok(_) => "allow",
            Err(e) => e.error_code(),
        };
        crate::metrics::record_decision(outcome, start.elapsed().as_secs_f64());
        result
    }

    async fn authorize_inner(
        &self,
        principal: Option<&Principal>,
        requirement: &PolicyRequirement,
        resource: &str,
    ) -> AccessResult<Authorization> {
        let Some(principal) = principal else {
            info!(resource = %resource, "Denied: no principal on request");
            return Err(AccessError::Unauthenticated);
        };

        let ability = self.factory.create(principal.role_id).await?;
        let decision = self.evaluate(&ability, requirement);

        if !decision.allowed {
            info!(
                principal = %principal.id,
                role_id = principal.role_id,
                resource = %resource,
                "Denied: requirement not met"
            );
            return Err(AccessError::Forbidden {
                resource: resource.to_string(),
            });
        }

        debug!(
            principal = %principal.id,
            role_id = principal.role_id,
            resource = %resource,
            features = decision.enabled_features.grants().len(),
            "Allowed"
        );
        Ok(Authorization {
            principal_id: principal.id.clone(),
            enabled_features: decision.enabled_features,
        })
    }
}
