//! Permission catalog.
//!
//! The catalog accumulates every `(action, subject, description)` triple the
//! service declares and serves deduplicated listings for administration UIs.
//! It is an explicit object owned by the composition root, not a global.
//!
//! # Lifecycle
//!
//! ```text
//! Unregistered --register()--> Accumulating --seal()--> Sealed
//!      |                            ^
//!      +-- first register() truncates the stored snapshot
//! ```
//!
//! Registration is only legal before [`PermissionCatalog::seal`]. Reads are
//! legal in every state.
//!
//! # Persistence
//!
//! The first registration resets the snapshot, every registration appends
//! to it and [`PermissionCatalog::seal`] compacts it to the deduplicated
//! list. Failures are logged and counted but never fail the registration;
//! the in-memory catalog stays usable.

pub mod snapshot;

pub use snapshot::{JsonFileSnapshot, MemorySnapshot, SnapshotStore};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::ability::{Action, Grant};
use crate::error::{AccessError, AccessResult};

/// A declared permission. Identity is `(action, subject)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub subject: String,
    pub action: Action,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Permission {
    pub fn new(
        subject: impl Into<String>,
        action: impl Into<Action>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            action: action.into(),
            description: description.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The `(action, subject)` identity of this permission.
    pub fn key(&self) -> Grant {
        Grant::new(self.action.clone(), self.subject.clone())
    }

    /// Catalog grouping of this permission.
    pub fn category(&self) -> &str {
        category_of(&self.subject)
    }
}

/// Leading path segment of a subject, e.g. `banners` for `banners/:id`.
pub fn category_of(subject: &str) -> &str {
    let trimmed = subject.trim_start_matches('/');
    trimmed.split('/').next().unwrap_or(trimmed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryStatus {
    #[default]
    Active,
    Inactive,
}

/// Administrative metadata for one catalog category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMeta {
    pub category: String,
    pub display_name: String,
    #[serde(default)]
    pub status: CategoryStatus,
    /// Permissions listed under the category even when no route declares them.
    #[serde(default)]
    pub static_features: Vec<Permission>,
    /// Permissions kept out of listings. Still enforced when a route requires them.
    #[serde(default)]
    pub hidden_features: Vec<Permission>,
}

impl CategoryMeta {
    pub fn new(category: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            display_name: display_name.into(),
            status: CategoryStatus::Active,
            static_features: Vec::new(),
            hidden_features: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CategoryStatus::Active
    }
}

/// One category's listing as served to administration UIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub category: String,
    pub display_name: String,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogState {
    /// Nothing registered since the process started.
    Unregistered,
    /// Snapshot has been reset; registrations append.
    Accumulating,
    /// Startup registration finished; read-only.
    Sealed,
}

#[derive(Debug)]
struct CatalogEntries {
    state: CatalogState,
    permissions: Vec<Permission>,
    index: HashMap<Grant, usize>,
}

impl CatalogEntries {
    fn from_permissions(state: CatalogState, permissions: Vec<Permission>) -> Self {
        let mut entries = Self {
            state,
            permissions: Vec::with_capacity(permissions.len()),
            index: HashMap::new(),
        };
        for permission in permissions {
            entries.upsert(permission);
        }
        entries
    }

    fn upsert(&mut self, permission: Permission) {
        let key = permission.key();
        match self.index.get(&key) {
            Some(&pos) => self.permissions[pos] = permission,
            None => {
                self.index.insert(key, self.permissions.len());
                self.permissions.push(permission);
            }
        }
    }
}

/// Deduplicated catalog of declared permissions.
pub struct PermissionCatalog {
    entries: RwLock<CatalogEntries>,
    categories: Vec<CategoryMeta>,
    snapshot: Box<dyn SnapshotStore>,
    /// Serializes upsert + snapshot write so snapshots never go backwards.
    write_lock: Mutex<()>,
}

impl PermissionCatalog {
    /// Create an empty catalog in the `Unregistered` state.
    pub fn new(categories: Vec<CategoryMeta>, snapshot: Box<dyn SnapshotStore>) -> Self {
        Self {
            entries: RwLock::new(CatalogEntries::from_permissions(
                CatalogState::Unregistered,
                Vec::new(),
            )),
            categories,
            snapshot,
            write_lock: Mutex::new(()),
        }
    }

    /// Catalog with no category metadata and an in-memory snapshot.
    pub fn in_memory() -> Self {
        Self::new(Vec::new(), Box::new(MemorySnapshot::new()))
    }

    /// Load a previously written snapshot as a sealed, read-only catalog.
    ///
    /// The stored snapshot is left untouched.
    pub fn restore(categories: Vec<CategoryMeta>, snapshot: Box<dyn SnapshotStore>) -> Self {
        let permissions = snapshot.read_all();
        info!(count = permissions.len(), "Restored permission catalog from snapshot");
        Self {
            entries: RwLock::new(CatalogEntries::from_permissions(
                CatalogState::Sealed,
                permissions,
            )),
            categories,
            snapshot,
            write_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> CatalogState {
        self.entries.read().state
    }

    pub fn categories(&self) -> &[CategoryMeta] {
        &self.categories
    }

    /// Upsert a permission keyed by `(action, subject)`; the last description wins.
    ///
    /// The first registration after construction truncates the stored
    /// snapshot. Snapshot write failures are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// [`AccessError::CatalogSealed`] after [`seal`](Self::seal).
    pub fn register(&self, permission: Permission) -> AccessResult<()> {
        let _write = self.write_lock.lock();

        let (first, count) = {
            let mut entries = self.entries.write();
            let first = match entries.state {
                CatalogState::Sealed => {
                    return Err(AccessError::CatalogSealed {
                        subject: permission.subject,
                        action: permission.action.to_string(),
                    });
                }
                CatalogState::Unregistered => {
                    entries.state = CatalogState::Accumulating;
                    true
                }
                CatalogState::Accumulating => false,
            };

            debug!(
                action = %permission.action,
                subject = %permission.subject,
                "Permission registered"
            );
            entries.upsert(permission.clone());
            (first, entries.permissions.len())
        };

        crate::metrics::set_catalog_size(count);
        self.persist(first, &permission);
        Ok(())
    }

    fn persist(&self, reset: bool, permission: &Permission) {
        if reset {
            if let Err(e) = self.snapshot.reset() {
                warn!(error = %e, "Failed to reset catalog snapshot");
                crate::metrics::record_catalog_write_failure();
            } else {
                info!("Catalog snapshot reset");
            }
        }

        if let Err(e) = self.snapshot.append(permission) {
            warn!(error = %e, subject = %permission.subject, "Failed to append to catalog snapshot");
            crate::metrics::record_catalog_write_failure();
        }
    }

    /// Finish startup registration. Further `register` calls are rejected.
    ///
    /// A catalog that accumulated registrations compacts its snapshot here.
    pub fn seal(&self) {
        let _write = self.write_lock.lock();

        let compacted = {
            let mut entries = self.entries.write();
            let previous = entries.state;
            if previous == CatalogState::Sealed {
                return;
            }
            entries.state = CatalogState::Sealed;
            info!(count = entries.permissions.len(), "Permission catalog sealed");
            (previous == CatalogState::Accumulating).then(|| entries.permissions.clone())
        };

        if let Some(permissions) = compacted
            && let Err(e) = self.snapshot.write_all(&permissions)
        {
            warn!(error = %e, count = permissions.len(), "Failed to compact catalog snapshot");
            crate::metrics::record_catalog_write_failure();
        }
    }

    /// Number of distinct permissions, hidden ones included.
    pub fn len(&self) -> usize {
        self.entries.read().permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether exactly `(action, subject)` has been declared.
    pub fn contains(&self, action: &Action, subject: &str) -> bool {
        self.entries
            .read()
            .index
            .contains_key(&Grant::new(action.clone(), subject))
    }

    /// Distinct permissions in registration order.
    ///
    /// Permissions of inactive categories and pairs listed as a hidden
    /// feature of an active category are left out.
    pub fn list(&self) -> Vec<Permission> {
        let hidden = self.hidden_keys();
        let inactive = self.inactive_categories();

        self.entries
            .read()
            .permissions
            .iter()
            .filter(|p| !inactive.contains(p.category()) && !hidden.contains(&p.key()))
            .cloned()
            .collect()
    }

    /// Visible permissions bucketed by category.
    ///
    /// Categories with metadata come first in configuration order, each
    /// starting with its static features. Inactive categories are dropped
    /// entirely. Categories without metadata follow in first-registration
    /// order under their raw name. Empty groups are omitted.
    pub fn group_by_category(&self) -> Vec<CategoryGroup> {
        let hidden = self.hidden_keys();
        let mut buckets: HashMap<String, Vec<Permission>> = HashMap::new();
        let mut unknown_order: Vec<String> = Vec::new();

        for permission in self.entries.read().permissions.iter() {
            if hidden.contains(&permission.key()) {
                continue;
            }
            let category = permission.category().to_string();
            if !buckets.contains_key(&category)
                && !self.categories.iter().any(|c| c.category == category)
            {
                unknown_order.push(category.clone());
            }
            buckets.entry(category).or_default().push(permission.clone());
        }

        let mut groups = Vec::new();

        for meta in &self.categories {
            let declared = buckets.remove(&meta.category).unwrap_or_default();
            if !meta.is_active() {
                continue;
            }

            let mut seen: HashSet<Grant> = HashSet::new();
            let mut permissions = Vec::new();
            for permission in meta.static_features.iter().chain(declared.iter()) {
                let key = permission.key();
                if hidden.contains(&key) || !seen.insert(key) {
                    continue;
                }
                permissions.push(permission.clone());
            }

            if !permissions.is_empty() {
                groups.push(CategoryGroup {
                    category: meta.category.clone(),
                    display_name: meta.display_name.clone(),
                    permissions,
                });
            }
        }

        for category in unknown_order {
            if let Some(permissions) = buckets.remove(&category) {
                groups.push(CategoryGroup {
                    display_name: category.clone(),
                    category,
                    permissions,
                });
            }
        }

        groups
    }

    /// UI-only grants offered by active categories.
    ///
    /// This is the allowlist the policy evaluator checks for
    /// additional enabled features.
    pub fn feature_allowlist(&self) -> Vec<Grant> {
        self.categories
            .iter()
            .filter(|c| c.is_active())
            .flat_map(|c| c.static_features.iter().map(Permission::key))
            .collect()
    }

    fn hidden_keys(&self) -> HashSet<Grant> {
        self.categories
            .iter()
            .filter(|c| c.is_active())
            .flat_map(|c| c.hidden_features.iter().map(Permission::key))
            .collect()
    }

    fn inactive_categories(&self) -> HashSet<&str> {
        self.categories
            .iter()
            .filter(|c| !c.is_active())
            .map(|c| c.category.as_str())
            .collect()
    }
}

impl std::fmt::Debug for PermissionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        f.debug_struct("PermissionCatalog")
            .field("state", &entries.state)
            .field("permissions", &entries.permissions.len())
            .field("categories", &self.categories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn banners_meta() -> CategoryMeta {
        let mut meta = CategoryMeta::new("banners", "Banners");
        meta.static_features = vec![Permission::new("banners", "block", "Block banner")];
        meta.hidden_features = vec![Permission::new("banners/:id", "delete", "")];
        meta
    }

    #[test]
    fn test_category_of() {
        assert_eq!(category_of("banners"), "banners");
        assert_eq!(category_of("banners/:id"), "banners");
        assert_eq!(category_of("/users/:id/roles"), "users");
        assert_eq!(category_of(""), "");
    }

    #[test]
    fn test_reregistration_keeps_one_entry_with_latest_description() {
        let catalog = PermissionCatalog::in_memory();
        catalog.register(Permission::new("banners", "create", "d1")).unwrap();
        catalog.register(Permission::new("banners", "create", "d2")).unwrap();
        catalog.register(Permission::new("banners", "create", "d3")).unwrap();

        let listed = catalog.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].description, "d3");
        assert!(catalog.contains(&Action::Create, "banners"));
    }

    #[test]
    fn test_state_machine() {
        let catalog = PermissionCatalog::in_memory();
        assert_eq!(catalog.state(), CatalogState::Unregistered);
        catalog.register(Permission::new("banners", "read", "")).unwrap();
        assert_eq!(catalog.state(), CatalogState::Accumulating);
        catalog.seal();
        assert_eq!(catalog.state(), CatalogState::Sealed);

        let err = catalog
            .register(Permission::new("users", "read", ""))
            .unwrap_err();
        assert!(matches!(err, AccessError::CatalogSealed { .. }));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_first_register_resets_stale_snapshot() {
        let snapshot = Arc::new(MemorySnapshot::with_permissions(vec![Permission::new(
            "legacy", "read", "stale",
        )]));
        let catalog = PermissionCatalog::new(Vec::new(), Box::new(Arc::clone(&snapshot)));
        catalog.register(Permission::new("banners", "read", "")).unwrap();
        catalog.register(Permission::new("banners", "update", "")).unwrap();

        let stored = snapshot.read_all();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|p| p.subject != "legacy"));
    }

    #[test]
    fn test_list_hides_hidden_and_inactive() {
        let mut inactive = CategoryMeta::new("payroll", "Payroll");
        inactive.status = CategoryStatus::Inactive;
        let catalog =
            PermissionCatalog::new(vec![banners_meta(), inactive], Box::new(MemorySnapshot::new()));

        catalog.register(Permission::new("banners", "read", "")).unwrap();
        catalog.register(Permission::new("banners/:id", "delete", "")).unwrap();
        catalog.register(Permission::new("payroll", "read", "")).unwrap();

        let keys: Vec<_> = catalog.list().iter().map(Permission::key).collect();
        assert_eq!(keys, vec![Grant::new("read", "banners")]);
        // Hidden pairs stay declared.
        assert!(catalog.contains(&Action::Delete, "banners/:id"));
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_group_by_category() {
        let mut inactive = CategoryMeta::new("payroll", "Payroll");
        inactive.status = CategoryStatus::Inactive;
        let catalog =
            PermissionCatalog::new(vec![banners_meta(), inactive], Box::new(MemorySnapshot::new()));

        catalog.register(Permission::new("users", "read", "")).unwrap();
        catalog.register(Permission::new("banners", "read", "")).unwrap();
        catalog.register(Permission::new("banners/:id", "update", "")).unwrap();
        catalog.register(Permission::new("banners/:id", "delete", "")).unwrap();
        catalog.register(Permission::new("payroll", "read", "")).unwrap();

        let groups = catalog.group_by_category();
        let names: Vec<_> = groups.iter().map(|g| g.category.as_str()).collect();
        assert_eq!(names, vec!["banners", "users"]);

        let banners = &groups[0];
        assert_eq!(banners.display_name, "Banners");
        let keys: Vec<_> = banners.permissions.iter().map(Permission::key).collect();
        assert_eq!(
            keys,
            vec![
                Grant::new("block", "banners"),
                Grant::new("read", "banners"),
                Grant::new("update", "banners/:id"),
            ]
        );
        assert_eq!(groups[1].display_name, "users");
    }

    #[test]
    fn test_static_features_listed_without_routes() {
        let catalog = PermissionCatalog::new(vec![banners_meta()], Box::new(MemorySnapshot::new()));
        let groups = catalog.group_by_category();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].permissions[0].action, Action::Other("block".into()));
        assert_eq!(catalog.feature_allowlist(), vec![Grant::new("block", "banners")]);
    }

    struct FailingSnapshot {
        attempts: AtomicUsize,
    }

    impl SnapshotStore for FailingSnapshot {
        fn reset(&self) -> Result<(), CatalogError> {
            Err(CatalogError::Io(std::io::Error::other("read-only fs")))
        }

        fn append(&self, _permission: &Permission) -> Result<(), CatalogError> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Err(CatalogError::Io(std::io::Error::other("read-only fs")))
        }

        fn write_all(&self, _permissions: &[Permission]) -> Result<(), CatalogError> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Err(CatalogError::Io(std::io::Error::other("read-only fs")))
        }

        fn read_all(&self) -> Vec<Permission> {
            Vec::new()
        }
    }

    #[test]
    fn test_write_failure_does_not_abort_registration() {
        let catalog = PermissionCatalog::new(
            Vec::new(),
            Box::new(FailingSnapshot {
                attempts: AtomicUsize::new(0),
            }),
        );
        catalog.register(Permission::new("banners", "read", "")).unwrap();
        catalog.register(Permission::new("users", "read", "")).unwrap();
        assert_eq!(catalog.list().len(), 2);
    }

    /// Counts snapshot calls.
    #[derive(Default)]
    struct CountingSnapshot {
        appends: AtomicUsize,
        rewrites: AtomicUsize,
        inner: MemorySnapshot,
    }

    impl SnapshotStore for CountingSnapshot {
        fn reset(&self) -> Result<(), CatalogError> {
            self.inner.reset()
        }

        fn append(&self, permission: &Permission) -> Result<(), CatalogError> {
            self.appends.fetch_add(1, Ordering::Relaxed);
            self.inner.append(permission)
        }

        fn write_all(&self, permissions: &[Permission]) -> Result<(), CatalogError> {
            self.rewrites.fetch_add(1, Ordering::Relaxed);
            self.inner.write_all(permissions)
        }

        fn read_all(&self) -> Vec<Permission> {
            self.inner.read_all()
        }
    }

    #[test]
    fn test_registration_appends_and_seal_compacts_once() {
        let snapshot = Arc::new(CountingSnapshot::default());
        let catalog = PermissionCatalog::new(Vec::new(), Box::new(Arc::clone(&snapshot)));

        for i in 0..50 {
            catalog
                .register(Permission::new(format!("subject{}", i % 10), "read", format!("v{i}")))
                .unwrap();
        }
        assert_eq!(snapshot.appends.load(Ordering::Relaxed), 50);
        assert_eq!(snapshot.rewrites.load(Ordering::Relaxed), 0);
        assert_eq!(snapshot.read_all().len(), 50);

        catalog.seal();
        catalog.seal();
        assert_eq!(snapshot.rewrites.load(Ordering::Relaxed), 1);

        let stored = snapshot.read_all();
        assert_eq!(stored.len(), 10);
        assert_eq!(stored[0].description, "v40");
    }

    #[test]
    fn test_seal_without_registrations_keeps_snapshot() {
        let snapshot = Arc::new(CountingSnapshot::default());
        snapshot.inner.append(&Permission::new("banners", "read", "")).unwrap();
        let catalog = PermissionCatalog::new(Vec::new(), Box::new(Arc::clone(&snapshot)));
        catalog.seal();
        assert_eq!(snapshot.rewrites.load(Ordering::Relaxed), 0);
        assert_eq!(snapshot.read_all().len(), 1);
    }

    #[test]
    fn test_restore_is_sealed_and_preserves_snapshot() {
        let snapshot = Arc::new(MemorySnapshot::with_permissions(vec![
            Permission::new("banners", "read", "a"),
            Permission::new("banners", "read", "b"),
        ]));
        let catalog = PermissionCatalog::restore(Vec::new(), Box::new(Arc::clone(&snapshot)));
        assert_eq!(catalog.state(), CatalogState::Sealed);
        assert_eq!(catalog.list().len(), 1);
        assert_eq!(catalog.list()[0].description, "b");
        assert_eq!(snapshot.read_all().len(), 2);
    }
}
