//! axum transport adapter for route bindings.
//!
//! Upstream authentication is expected to place a [`Principal`] in the
//! request extensions. Protected routes run [`policy_guard`] as a route
//! layer: it rejects with the [`AccessError`] status, or inserts the
//! [`EnabledFeatures`] into the request extensions and calls the handler.
//! Public routes are mounted without the guard.

use axum::Json;
use axum::Router;
use axum::extract::{Request, State};
use axum::handler::Handler;
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, on};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::{ActionKind, RouteBinder, RouteBinding};
use crate::catalog::PermissionCatalog;
use crate::error::{AccessError, AccessResult};
use crate::policy::{EnabledFeatures, PolicyEvaluator, PolicyRequirement, Principal};
use crate::roles::RoleStore;

/// State handed to [`policy_guard`] for one route.
struct PolicyGuard<S> {
    evaluator: Arc<PolicyEvaluator<S>>,
    requirement: Arc<PolicyRequirement>,
    resource: Arc<str>,
}

impl<S> Clone for PolicyGuard<S> {
    fn clone(&self) -> Self {
        Self {
            evaluator: Arc::clone(&self.evaluator),
            requirement: Arc::clone(&self.requirement),
            resource: Arc::clone(&self.resource),
        }
    }
}

async fn policy_guard<S: RoleStore + 'static>(
    State(guard): State<PolicyGuard<S>>,
    mut request: Request,
    next: Next,
) -> Response {
    let principal = request.extensions().get::<Principal>().cloned();

    match guard
        .evaluator
        .authorize(principal.as_ref(), &guard.requirement, &guard.resource)
        .await
    {
        Ok(authorization) => {
            request
                .extensions_mut()
                .insert::<EnabledFeatures>(authorization.enabled_features);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Collects route bindings into an axum [`Router`].
///
/// [`into_router`](Self::into_router) seals the catalog; routes must all be
/// declared before it is called.
pub struct AdminRouter<S> {
    binder: RouteBinder,
    evaluator: Arc<PolicyEvaluator<S>>,
    router: Router,
    bound: HashSet<(Method, String)>,
    /// Route shape to the concrete path first mounted with it.
    shapes: HashMap<String, String>,
}

impl<S: RoleStore + 'static> AdminRouter<S> {
    pub fn new(
        catalog: Arc<PermissionCatalog>,
        evaluator: Arc<PolicyEvaluator<S>>,
        strict_action_kinds: bool,
    ) -> Self {
        Self {
            binder: RouteBinder::new(catalog, strict_action_kinds),
            evaluator,
            router: Router::new(),
            bound: HashSet::new(),
            shapes: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<PermissionCatalog> {
        self.binder.catalog()
    }

    /// Number of routes mounted so far.
    pub fn route_count(&self) -> usize {
        self.bound.len()
    }

    /// Bind `handler` to `subject` by action-kind name.
    ///
    /// # Errors
    ///
    /// [`AccessError::InvalidBinding`] for unknown kinds in strict mode or a
    /// repeated method and path; [`AccessError::CatalogSealed`] if the catalog
    /// was sealed elsewhere.
    pub fn route<H, T>(
        self,
        subject: &str,
        kind: &str,
        description: &str,
        handler: H,
    ) -> AccessResult<Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let kind = self.binder.resolve_kind(subject, kind)?;
        self.route_kind(subject, kind, description, handler)
    }

    /// Bind `handler` to `subject` with a typed action kind.
    pub fn route_kind<H, T>(
        self,
        subject: &str,
        kind: ActionKind,
        description: &str,
        handler: H,
    ) -> AccessResult<Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.check_unbound(subject, kind)?;
        let binding = self.binder.bind_kind(subject, kind, description)?;
        Ok(self.mount(binding, handler))
    }

    /// Bind `handler` to `subject` with an explicit requirement.
    pub fn route_with<H, T>(
        self,
        subject: &str,
        kind: ActionKind,
        description: &str,
        requirement: PolicyRequirement,
        handler: H,
    ) -> AccessResult<Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.check_unbound(subject, kind)?;
        let binding = self
            .binder
            .bind_with(subject, kind, description, requirement)?;
        Ok(self.mount(binding, handler))
    }

    /// Mount `GET /permissions` and `GET /permissions/categories` as
    /// protected `read` routes on the `permissions` subject.
    pub fn with_catalog_listing(self) -> AccessResult<Self> {
        let catalog = Arc::clone(self.catalog());
        let grouped = Arc::clone(&catalog);

        self.route_kind(
            "permissions",
            ActionKind::Read,
            "List permissions",
            move || {
                let catalog = Arc::clone(&catalog);
                async move { Json(catalog.list()) }
            },
        )?
        .route_kind(
            "permissions/categories",
            ActionKind::Read,
            "List permissions by category",
            move || {
                let catalog = Arc::clone(&grouped);
                async move { Json(catalog.group_by_category()) }
            },
        )
    }

    /// Seal the catalog and return the finished router.
    pub fn into_router(self) -> Router {
        let span = crate::telemetry::spans::registration(self.bound.len());
        let _enter = span.enter();

        self.binder.catalog().seal();
        info!(
            routes = self.bound.len(),
            permissions = self.binder.catalog().len(),
            "Admin routes registered"
        );
        self.router
    }

    /// Reject a binding the router would refuse, before anything is
    /// registered in the catalog.
    fn check_unbound(&self, subject: &str, kind: ActionKind) -> AccessResult<()> {
        let path = super::route_path(subject);

        if let Some(existing) = self.shapes.get(&super::route_shape(&path))
            && *existing != path
        {
            return Err(AccessError::InvalidBinding {
                subject: subject.to_string(),
                reason: format!("path {path} conflicts with {existing}"),
            });
        }
        if self.bound.contains(&(kind.method(), path)) {
            return Err(AccessError::InvalidBinding {
                subject: subject.to_string(),
                reason: format!("{} route already bound", kind.method()),
            });
        }
        Ok(())
    }

    fn mount<H, T>(mut self, binding: RouteBinding, handler: H) -> Self
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let path = binding.full_path();
        let method_router = on(binding.kind.method_filter(), handler);

        let method_router = match binding.requirement {
            Some(requirement) => {
                let guard = PolicyGuard {
                    evaluator: Arc::clone(&self.evaluator),
                    requirement: Arc::new(requirement),
                    resource: Arc::from(binding.subject.as_str()),
                };
                method_router.route_layer(middleware::from_fn_with_state(
                    guard,
                    policy_guard::<S>,
                ))
            }
            None => method_router,
        };

        debug!(method = %binding.kind.method(), path = %path, "Route mounted");
        self.shapes
            .entry(super::route_shape(&path))
            .or_insert_with(|| path.clone());
        self.bound.insert((binding.kind.method(), path.clone()));
        self.router = self.router.route(&path, method_router);
        self
    }
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Router serving the Prometheus `/metrics` endpoint.
///
/// Mount it on an internal listener; it carries no policy guard.
pub fn metrics_routes() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::AbilityFactory;
    use crate::roles::InMemoryRoleStore;

    fn admin_router() -> AdminRouter<InMemoryRoleStore> {
        let catalog = Arc::new(PermissionCatalog::in_memory());
        let evaluator = Arc::new(PolicyEvaluator::new(
            AbilityFactory::new(InMemoryRoleStore::new()),
            Vec::new(),
        ));
        AdminRouter::new(catalog, evaluator, false)
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let router = admin_router()
            .route("banners", "read", "List banners", || async { "ok" })
            .unwrap();
        let err = router
            .route("banners", "read", "List banners again", || async { "ok" })
            .err()
            .unwrap();
        assert!(matches!(err, AccessError::InvalidBinding { .. }));
    }

    #[test]
    fn test_renamed_parameter_is_rejected_before_registration() {
        let router = admin_router()
            .route("banners/:id", "update", "Edit banner", || async { "ok" })
            .unwrap();
        let err = router
            .route("banners/:bannerId", "delete", "Delete banner", || async { "ok" })
            .err()
            .unwrap();
        assert!(matches!(err, AccessError::InvalidBinding { .. }));
    }

    #[test]
    fn test_renamed_parameter_leaves_catalog_untouched() {
        let router = admin_router()
            .route("banners/:id", "update", "Edit banner", || async { "ok" })
            .unwrap();
        let catalog = Arc::clone(router.catalog());
        assert!(
            router
                .route("banners/:bannerId", "delete", "Delete banner", || async { "ok" })
                .is_err()
        );
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.contains(&crate::ability::Action::Delete, "banners/:bannerId"));
    }

    #[test]
    fn test_same_parameter_name_shares_a_path() {
        let router = admin_router()
            .route("banners/:id", "update", "Edit banner", || async { "ok" })
            .unwrap()
            .route("banners/:id", "delete", "Delete banner", || async { "ok" })
            .unwrap();
        assert_eq!(router.route_count(), 2);
        let _app = router.into_router();
    }

    #[test]
    fn test_methods_share_a_path() {
        let router = admin_router()
            .route("banners", "read", "List banners", || async { "ok" })
            .unwrap()
            .route("banners", "create", "Create banner", || async { "ok" })
            .unwrap();
        assert_eq!(router.route_count(), 2);
        assert_eq!(router.catalog().len(), 2);
    }

    #[test]
    fn test_into_router_seals_catalog() {
        let router = admin_router()
            .route("banners", "read", "List banners", || async { "ok" })
            .unwrap();
        let catalog = Arc::clone(router.catalog());
        let _app = router.into_router();
        assert_eq!(catalog.state(), crate::catalog::CatalogState::Sealed);
    }
}
