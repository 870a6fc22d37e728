//! Main entry point for the enforcement engine.
//!
//! The [`Zeolite`] struct wires the resolver, the session binder, the load
//! interceptor, and the login-location policy over one set of host
//! collaborators, and carries the administrative surface for grants and
//! filter toggles.

use std::sync::Arc;

use tracing::info;
use zeolite_types::{
    AccessibleScopes, Dimension, EntitySnapshot, LocationId, RoleName, ScopeKey, ScopeKeySet,
};

use crate::backend::{FilterSession, GrantStore, PrincipalProvider, PropertyStore};
use crate::binding::SessionBinder;
use crate::config::EngineConfig;
use crate::context::AccessContext;
use crate::error::Result;
use crate::interceptor::LoadInterceptor;
use crate::login::LoginLocationPolicy;
use crate::registry::FilterRegistry;
use crate::resolver::AccessResolver;

/// The enforcement engine handle.
///
/// One instance serves the whole process; units of work are kept apart by
/// the [`AccessContext`] values it hands out. Cheap to share behind an
/// `Arc`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use zeolite::memory::{InMemoryGrants, InMemoryPrincipals, InMemoryProperties};
/// use zeolite::{Dimension, EngineConfig, LocationId, PersonId, Principal, UserId, Zeolite};
///
/// let principals = Arc::new(InMemoryPrincipals::signed_in(
///     Principal::new(UserId::new(1)).with_role("Nurse"),
/// ));
/// let grants = Arc::new(
///     InMemoryGrants::new()
///         .with_basis("Nurse", Dimension::Location, LocationId::new(1))
///         .with_person_at(Dimension::Location, LocationId::new(1), PersonId::new(42)),
/// );
/// let properties = Arc::new(InMemoryProperties::new());
/// let engine = Zeolite::new(principals, grants, properties, EngineConfig::default());
///
/// let ctx = engine.new_context();
/// let scopes = engine.accessible_scopes(&ctx, Dimension::Location)?;
/// assert!(scopes.contains(&PersonId::new(42).into()));
/// # Ok::<(), zeolite::EnforcementError>(())
/// ```
#[derive(Debug)]
pub struct Zeolite {
    config: EngineConfig,
    registry: Arc<FilterRegistry>,
    grants: Arc<dyn GrantStore>,
    resolver: AccessResolver,
    binder: SessionBinder,
    interceptor: LoadInterceptor,
    login: LoginLocationPolicy,
}

impl Zeolite {
    /// Builds an engine with the standard filter registrations.
    pub fn new(
        principals: Arc<dyn PrincipalProvider>,
        grants: Arc<dyn GrantStore>,
        properties: Arc<dyn PropertyStore>,
        config: EngineConfig,
    ) -> Self {
        Self::with_registry(
            principals,
            grants,
            properties,
            config,
            FilterRegistry::standard(),
        )
    }

    /// Builds an engine over an explicit filter registry.
    pub fn with_registry(
        principals: Arc<dyn PrincipalProvider>,
        grants: Arc<dyn GrantStore>,
        properties: Arc<dyn PropertyStore>,
        config: EngineConfig,
        registry: FilterRegistry,
    ) -> Self {
        let registry = Arc::new(registry);
        let resolver = AccessResolver::new(principals.clone(), grants.clone());
        let binder = SessionBinder::new(principals.clone(), registry.clone(), resolver.clone());
        let interceptor = LoadInterceptor::new(
            principals.clone(),
            properties.clone(),
            registry.clone(),
            resolver.clone(),
            &config,
        );
        let login = LoginLocationPolicy::new(principals, properties, resolver.clone(), &config);
        Self {
            config,
            registry,
            grants,
            resolver,
            binder,
            interceptor,
            login,
        }
    }

    /// Opens an access context for one unit of work.
    ///
    /// Contexts are not shared across units of work: resolved scopes are
    /// cached on the context, and staleness is bounded by its lifetime.
    pub fn new_context(&self) -> AccessContext {
        AccessContext::new()
    }

    /// Binds the enabled filters onto a query session.
    /// See [`SessionBinder::bind`].
    ///
    /// # Errors
    ///
    /// Propagates scope-resolution failures.
    pub fn bind_session(&self, ctx: &AccessContext, session: &mut dyn FilterSession) -> Result<()> {
        self.binder.bind(ctx, session)
    }

    /// Checks one materializing entity against the current principal.
    /// See [`LoadInterceptor::on_entity_load`].
    ///
    /// # Errors
    ///
    /// [`crate::EnforcementError::IllegalRecordAccess`] when the load is
    /// refused; store failures propagate.
    pub fn on_entity_load(
        &self,
        ctx: &AccessContext,
        session: &mut dyn FilterSession,
        snapshot: &EntitySnapshot,
    ) -> Result<()> {
        self.interceptor.on_entity_load(ctx, session, snapshot)
    }

    /// True when `location` may be offered to the current user at sign-in.
    ///
    /// # Errors
    ///
    /// Property and grant lookups may fail.
    pub fn login_location_allowed(
        &self,
        ctx: &AccessContext,
        location: LocationId,
    ) -> Result<bool> {
        self.login.location_allowed(ctx, location)
    }

    /// The person ids the current principal may access along a dimension.
    /// See [`AccessResolver::accessible_person_ids`].
    ///
    /// # Errors
    ///
    /// Grant-store failures propagate.
    pub fn accessible_scopes(
        &self,
        ctx: &AccessContext,
        dimension: Dimension,
    ) -> Result<AccessibleScopes> {
        self.resolver.accessible_person_ids(ctx, dimension)
    }

    /// The basis ids assigned to the current principal's roles.
    ///
    /// # Errors
    ///
    /// Grant-store failures propagate.
    pub fn assigned_basis_ids(
        &self,
        ctx: &AccessContext,
        dimension: Dimension,
    ) -> Result<ScopeKeySet> {
        self.resolver.assigned_basis_ids(ctx, dimension)
    }

    /// Enables or disables a registered filter engine-wide.
    ///
    /// Sessions bound after the change see the new flag; already-bound
    /// sessions keep whatever was bound on them.
    ///
    /// # Errors
    ///
    /// [`crate::EnforcementError::UnknownFilter`] for unregistered names.
    pub fn set_filter_enabled(&self, filter: &str, enabled: bool) -> Result<()> {
        self.registry.set_enabled(filter, enabled)?;
        if self.config.audit_enabled {
            info!(filter, enabled, "filter toggled");
        }
        Ok(())
    }

    /// Grants a basis to a role along a dimension.
    ///
    /// Takes effect for contexts opened after the change; an open context
    /// keeps the scopes it already resolved.
    ///
    /// # Errors
    ///
    /// Grant-store failures propagate.
    pub fn grant_access(
        &self,
        role: &RoleName,
        dimension: Dimension,
        basis: ScopeKey,
    ) -> Result<()> {
        self.grants.grant(role, dimension, basis.clone())?;
        if self.config.audit_enabled {
            info!(role = %role, dimension = %dimension, basis = %basis, "granted basis to role");
        }
        Ok(())
    }

    /// Revokes a basis from a role. Revoking an absent grant is a no-op.
    ///
    /// # Errors
    ///
    /// Grant-store failures propagate.
    pub fn revoke_access(
        &self,
        role: &RoleName,
        dimension: Dimension,
        basis: &ScopeKey,
    ) -> Result<()> {
        self.grants.revoke(role, dimension, basis)?;
        if self.config.audit_enabled {
            info!(role = %role, dimension = %dimension, basis = %basis, "revoked basis from role");
        }
        Ok(())
    }

    /// The filter registry backing this engine.
    pub fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
