//! Accessible-scope resolution.
//!
//! Resolves, for the current principal, the set of scope keys reachable
//! through role indirection: roles map to granted bases (locations,
//! programs), bases expand to the person ids attributed to them. The two
//! enforcement points and the login policy all consume this one resolution
//! path, so they can never disagree about what a user may see.

use std::sync::Arc;

use tracing::debug;
use zeolite_types::{
    AccessibleScopes, Dimension, EncounterId, EncounterTypeId, Principal, PrivilegeName,
    ScopeKeySet,
};

use crate::backend::{GrantStore, PrincipalProvider};
use crate::context::AccessContext;
use crate::error::Result;

/// Resolves a principal's accessible scopes through the grant store.
///
/// Cheap to clone; clones share the underlying collaborators.
#[derive(Debug, Clone)]
pub struct AccessResolver {
    principals: Arc<dyn PrincipalProvider>,
    grants: Arc<dyn GrantStore>,
}

impl AccessResolver {
    pub fn new(principals: Arc<dyn PrincipalProvider>, grants: Arc<dyn GrantStore>) -> Self {
        Self { principals, grants }
    }

    /// Resolves the person ids the current principal may access along a
    /// dimension.
    ///
    /// The answer is never an empty key set: an unauthenticated caller,
    /// and a caller whose roles reach no persons, both resolve to the
    /// no-match sentinel. Super-users resolve to [`AccessibleScopes::All`];
    /// enforcement points short-circuit before resolving them, so the
    /// unrestricted arm only surfaces on direct calls.
    ///
    /// The resolution runs under the context's resolution marker and the
    /// result is cached on the context for the rest of the unit of work.
    ///
    /// # Errors
    ///
    /// Grant-store failures propagate uninterpreted.
    pub fn accessible_person_ids(
        &self,
        ctx: &AccessContext,
        dimension: Dimension,
    ) -> Result<AccessibleScopes> {
        let Some(principal) = self.principals.current_principal() else {
            return Ok(AccessibleScopes::no_match());
        };
        if principal.is_super_user() {
            return Ok(AccessibleScopes::All);
        }
        if let Some(cached) = ctx.cached_scopes(principal.user_id(), dimension) {
            return Ok(cached);
        }

        let resolved = {
            let _guard = ctx.enter_resolution();
            let bases = self.basis_union(&principal, dimension)?;
            if bases.is_empty() {
                AccessibleScopes::no_match()
            } else {
                let persons = self.grants.person_ids_at(dimension, &bases)?;
                if persons.is_empty() {
                    AccessibleScopes::no_match()
                } else {
                    AccessibleScopes::Keys(persons)
                }
            }
        };

        ctx.cache_scopes(principal.user_id(), dimension, resolved.clone());
        debug!(
            user = %principal.user_id(),
            dimension = %dimension,
            "resolved accessible person ids"
        );
        Ok(resolved)
    }

    /// The basis ids assigned to the current principal's roles, without
    /// person expansion.
    ///
    /// This is an administrative/UI view, not a query restriction, so the
    /// empty set is a legitimate answer here: an unauthenticated caller or
    /// one with no grants simply has no assigned bases.
    pub fn assigned_basis_ids(
        &self,
        ctx: &AccessContext,
        dimension: Dimension,
    ) -> Result<ScopeKeySet> {
        let Some(principal) = self.principals.current_principal() else {
            return Ok(ScopeKeySet::new());
        };
        let _guard = ctx.enter_resolution();
        self.basis_union(&principal, dimension)
    }

    /// The privilege required to view records of an encounter type, if
    /// one is configured.
    pub fn encounter_view_privilege(
        &self,
        ctx: &AccessContext,
        encounter_type: EncounterTypeId,
    ) -> Result<Option<PrivilegeName>> {
        let _guard = ctx.enter_resolution();
        Ok(self.grants.view_privilege(encounter_type)?)
    }

    /// Resolves an encounter's type by id.
    ///
    /// Runs under the resolution marker: a host adapter that answers this
    /// by loading the encounter row will see that load admitted instead of
    /// re-intercepted.
    pub fn encounter_type_of(
        &self,
        ctx: &AccessContext,
        encounter: EncounterId,
    ) -> Result<Option<EncounterTypeId>> {
        let _guard = ctx.enter_resolution();
        Ok(self.grants.encounter_type_of(encounter)?)
    }

    fn basis_union(&self, principal: &Principal, dimension: Dimension) -> Result<ScopeKeySet> {
        let mut bases = ScopeKeySet::new();
        for role in principal.roles() {
            bases.extend(self.grants.basis_ids(role, dimension)?);
        }
        Ok(bases)
    }
}
