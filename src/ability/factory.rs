//! Ability construction from stored roles.

use tracing::{debug, error};

use super::{Ability, parse_access};
use crate::error::{AccessError, AccessResult};
use crate::roles::{RoleId, RoleStore};

/// Builds an [`Ability`] for a role by reading it from a [`RoleStore`].
///
/// Holds no state besides the store; a fresh ability is built on every call.
pub struct AbilityFactory<S> {
    store: S,
}

impl<S: RoleStore> AbilityFactory<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Build the ability for `role_id`.
    ///
    /// # Errors
    ///
    /// - [`AccessError::Unauthenticated`] when the role does not exist
    /// - [`AccessError::DataIntegrity`] when its access list is unparseable
    /// - [`AccessError::RoleStore`] when the lookup itself fails; it is not retried
    pub async fn create(&self, role_id: RoleId) -> AccessResult<Ability> {
        let Some(role) = self.store.get_role_by_id(role_id).await? else {
            debug!(role_id, "Role not found; treating principal as unauthenticated");
            return Err(AccessError::Unauthenticated);
        };

        let grants = parse_access(role.id, role.access.as_ref()).inspect_err(|e| {
            error!(role_id, role = %role.name, error = %e, "Role access list failed to parse");
        })?;

        debug!(role_id, role = %role.name, rules = grants.len(), "Ability built");
        Ok(Ability::from_grants(grants))
    }
}
