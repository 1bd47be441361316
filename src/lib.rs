//! admin-access - role-based access control for an administrative backend.
//!
//! - [`catalog`]: the registry of every declared permission
//! - [`ability`]: per-request grant evaluation built from a role's access list
//! - [`policy`]: requirement checks run before protected handlers
//! - [`binding`]: one-call route declarations and the axum adapter
//! - [`roles`]: role storage (SQLite, in-memory, cached)
//! - [`service`]: wiring everything from [`config::Config`]

pub mod ability;
pub mod binding;
pub mod catalog;
pub mod config;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod roles;
pub mod service;
pub mod telemetry;

pub use ability::{Ability, AbilityFactory, Action, Grant};
pub use binding::{ActionKind, AdminRouter, RouteBinder, RouteBinding};
pub use catalog::{CategoryMeta, Permission, PermissionCatalog};
pub use error::{AccessError, AccessResult};
pub use policy::{EnabledFeatures, PolicyEvaluator, PolicyRequirement, Predicate, Principal};
pub use roles::{Role, RoleId, RoleStore};
pub use service::AccessControl;
