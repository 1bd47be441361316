//! Composition root.
//!
//! [`AccessControl::from_config`] wires the catalog, role store and policy
//! evaluator together the way a host service starts up: connect the role
//! database, canonicalize legacy rows, pick the snapshot backend and derive
//! the feature allowlist from the configured categories.

use std::sync::Arc;
use tracing::info;

use crate::ability::{AbilityFactory, Grant};
use crate::binding::AdminRouter;
use crate::catalog::{JsonFileSnapshot, MemorySnapshot, PermissionCatalog, SnapshotStore};
use crate::config::Config;
use crate::policy::PolicyEvaluator;
use crate::roles::{CachedRoleStore, RoleId, RoleStore, RoleStoreError, SqliteRoleStore};

/// Role store as seen by the evaluator: SQLite, optionally behind the cache.
pub type SharedRoleStore = Arc<dyn RoleStore>;

/// Wired access-control components for one service instance.
pub struct AccessControl {
    catalog: Arc<PermissionCatalog>,
    roles: SqliteRoleStore,
    cache: Option<Arc<CachedRoleStore<SqliteRoleStore>>>,
    evaluator: Arc<PolicyEvaluator<SharedRoleStore>>,
    strict_action_kinds: bool,
}

impl AccessControl {
    /// Build every component from configuration.
    ///
    /// # Errors
    ///
    /// Fails when the role database cannot be opened or migrated.
    pub async fn from_config(config: &Config) -> Result<Self, RoleStoreError> {
        let roles = SqliteRoleStore::connect(&config.roles.database_path).await?;
        let migrated = roles.canonicalize_legacy_access().await?;
        if migrated > 0 {
            info!(rows = migrated, "Role access lists migrated at startup");
        }

        let snapshot: Box<dyn SnapshotStore> = match config.catalog.snapshot_path {
            Some(ref path) => Box::new(JsonFileSnapshot::new(path)),
            None => Box::new(MemorySnapshot::new()),
        };
        let catalog = Arc::new(PermissionCatalog::new(config.categories.clone(), snapshot));

        let cache = config
            .roles
            .cache
            .then(|| Arc::new(CachedRoleStore::new(roles.clone())));
        let store: SharedRoleStore = match cache {
            Some(ref cache) => Arc::clone(cache) as SharedRoleStore,
            None => Arc::new(roles.clone()),
        };

        let allowlist = catalog.feature_allowlist();
        info!(
            categories = config.categories.len(),
            features = allowlist.len(),
            cache = config.roles.cache,
            "Access control initialized"
        );

        Ok(Self {
            catalog,
            roles,
            cache,
            evaluator: Arc::new(PolicyEvaluator::new(AbilityFactory::new(store), allowlist)),
            strict_action_kinds: config.binding.strict_action_kinds,
        })
    }

    pub fn catalog(&self) -> &Arc<PermissionCatalog> {
        &self.catalog
    }

    pub fn evaluator(&self) -> &Arc<PolicyEvaluator<SharedRoleStore>> {
        &self.evaluator
    }

    /// Direct handle to the role database for administrative writes.
    pub fn roles(&self) -> &SqliteRoleStore {
        &self.roles
    }

    /// Start declaring routes against this instance's catalog.
    pub fn router(&self) -> AdminRouter<SharedRoleStore> {
        AdminRouter::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.evaluator),
            self.strict_action_kinds,
        )
    }

    /// Replace a role's grants and drop any cached copy.
    pub async fn update_role(
        &self,
        id: RoleId,
        name: &str,
        grants: &[Grant],
    ) -> Result<(), RoleStoreError> {
        self.roles.upsert_role(id, name, grants).await?;
        self.invalidate_role(id);
        Ok(())
    }

    /// Delete a role and drop any cached copy.
    pub async fn delete_role(&self, id: RoleId) -> Result<bool, RoleStoreError> {
        let removed = self.roles.delete_role(id).await?;
        self.invalidate_role(id);
        Ok(removed)
    }

    /// No-op unless the role cache is enabled.
    pub fn invalidate_role(&self, id: RoleId) {
        if let Some(ref cache) = self.cache {
            cache.invalidate(id);
        }
    }
}
