//! Role storage.
//!
//! The access-control core only reads roles. [`RoleStore`] is the lookup
//! contract; the SQLite implementation in [`sqlite`] is the production
//! store and [`InMemoryRoleStore`] serves tests and embedded setups.
//!
//! Lookups are never cached by default. [`CachedRoleStore`] is an explicit
//! opt-in decorator whose entries must be invalidated on role update.

mod cache;
pub mod sqlite;

pub use cache::CachedRoleStore;
pub use sqlite::SqliteRoleStore;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Role identifier as stored by the administrative backend.
pub type RoleId = i64;

/// A role and its persisted access list.
///
/// `access` is kept as raw JSON: legacy rows hold a JSON-encoded string
/// instead of an array, and parsing is deferred to
/// [`parse_access`](crate::ability::parse_access).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub access: Option<Value>,
}

/// Role store failures. Never retried by the core.
#[derive(Debug, Error)]
pub enum RoleStoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Lookup contract for roles.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Fetch a role by id. `Ok(None)` means the role does not exist.
    async fn get_role_by_id(&self, id: RoleId) -> Result<Option<Role>, RoleStoreError>;
}

#[async_trait]
impl<T: RoleStore + ?Sized> RoleStore for std::sync::Arc<T> {
    async fn get_role_by_id(&self, id: RoleId) -> Result<Option<Role>, RoleStoreError> {
        (**self).get_role_by_id(id).await
    }
}

/// Role store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    roles: DashMap<RoleId, Role>,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a role.
    pub fn upsert(&self, role: Role) {
        self.roles.insert(role.id, role);
    }

    pub fn remove(&self, id: RoleId) -> Option<Role> {
        self.roles.remove(&id).map(|(_, role)| role)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl FromIterator<Role> for InMemoryRoleStore {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let store = Self::new();
        for role in iter {
            store.upsert(role);
        }
        store
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get_role_by_id(&self, id: RoleId) -> Result<Option<Role>, RoleStoreError> {
        // Clone out so the shard guard drops before returning.
        Ok(self.roles.get(&id).map(|r| r.value().clone()))
    }
}
