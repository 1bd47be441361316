//! Opt-in role lookup cache.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{Role, RoleId, RoleStore, RoleStoreError};

/// Caches role lookups by id in front of another store.
///
/// Grants only take effect after [`invalidate`](Self::invalidate) is called
/// for the updated role. Misses (`None`) and errors are not cached.
pub struct CachedRoleStore<S> {
    inner: S,
    entries: DashMap<RoleId, Role>,
}

impl<S: RoleStore> CachedRoleStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
        }
    }

    /// Drop the cached entry for one role.
    pub fn invalidate(&self, id: RoleId) {
        if self.entries.remove(&id).is_some() {
            trace!(role_id = id, "Role cache entry invalidated");
        }
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.entries.len()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: RoleStore> RoleStore for CachedRoleStore<S> {
    async fn get_role_by_id(&self, id: RoleId) -> Result<Option<Role>, RoleStoreError> {
        if let Some(hit) = self.entries.get(&id).map(|r| r.value().clone()) {
            return Ok(Some(hit));
        }

        let role = self.inner.get_role_by_id(id).await?;
        if let Some(ref role) = role {
            self.entries.insert(id, role.clone());
        }
        Ok(role)
    }
}
