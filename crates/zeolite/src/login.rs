//! Login-location gating.
//!
//! Restricts which locations a user may pick at sign-in to the ones their
//! roles are actually granted. The gate is opt-in: it engages only when
//! the configured property names a user property to carry the login
//! location, matching deployments that drive sign-in screens from it.

use std::sync::Arc;

use zeolite_types::{Dimension, LocationId, Principal, ScopeKey};

use crate::backend::{PrincipalProvider, PropertyStore};
use crate::config::EngineConfig;
use crate::context::AccessContext;
use crate::error::Result;
use crate::resolver::AccessResolver;

/// Decides which locations the current user may select at sign-in.
#[derive(Debug, Clone)]
pub struct LoginLocationPolicy {
    principals: Arc<dyn PrincipalProvider>,
    properties: Arc<dyn PropertyStore>,
    resolver: AccessResolver,
    login_location_property: String,
}

impl LoginLocationPolicy {
    pub fn new(
        principals: Arc<dyn PrincipalProvider>,
        properties: Arc<dyn PropertyStore>,
        resolver: AccessResolver,
        config: &EngineConfig,
    ) -> Self {
        Self {
            principals,
            properties,
            resolver,
            login_location_property: config.login_location_property.clone(),
        }
    }

    /// True when `location` may be offered to the current user at sign-in.
    ///
    /// With the gating property unset or blank every location is offered.
    /// Once set, super-users keep the full list and everyone else is
    /// limited to locations their roles are granted as bases; a user with
    /// no grants, or no authentication, gets an empty list.
    ///
    /// # Errors
    ///
    /// Property and grant lookups may fail.
    pub fn location_allowed(&self, ctx: &AccessContext, location: LocationId) -> Result<bool> {
        let gate = self.properties.property(&self.login_location_property)?;
        if gate.is_none_or(|value| value.trim().is_empty()) {
            return Ok(true);
        }
        if self
            .principals
            .current_principal()
            .as_ref()
            .is_some_and(Principal::is_super_user)
        {
            return Ok(true);
        }
        let assigned = self.resolver.assigned_basis_ids(ctx, Dimension::Location)?;
        Ok(assigned.contains(&ScopeKey::from(location)))
    }
}
