//! Query-time filter binding.
//!
//! Binds the registered row filters onto a host query session so restricted
//! reads are constrained before any row leaves the store. Binding is the
//! first of the two enforcement points; the load interceptor backs it up
//! for anything that reaches the object graph by another path.

use std::sync::Arc;

use tracing::debug;
use zeolite_types::{AccessibleScopes, Dimension, Principal};

use crate::backend::{FilterSession, PrincipalProvider};
use crate::context::AccessContext;
use crate::error::Result;
use crate::registry::FilterRegistry;
use crate::resolver::AccessResolver;

/// Binds enabled filters and their scope parameters onto query sessions.
#[derive(Debug, Clone)]
pub struct SessionBinder {
    principals: Arc<dyn PrincipalProvider>,
    registry: Arc<FilterRegistry>,
    resolver: AccessResolver,
}

impl SessionBinder {
    pub fn new(
        principals: Arc<dyn PrincipalProvider>,
        registry: Arc<FilterRegistry>,
        resolver: AccessResolver,
    ) -> Self {
        Self {
            principals,
            registry,
            resolver,
        }
    }

    /// Binds every enabled location filter onto `session`, parameterized
    /// with the current principal's accessible person ids.
    ///
    /// Skips entirely for system threads, for super-users, and while a
    /// scope resolution is in flight on `ctx`. An unauthenticated caller
    /// is bound to the no-match sentinel, so restricted queries return
    /// nothing rather than everything. Binding the same session again
    /// overwrites the previous parameter values.
    ///
    /// # Errors
    ///
    /// Returns an error when scope resolution fails; the session is left
    /// untouched in that case.
    pub fn bind(&self, ctx: &AccessContext, session: &mut dyn FilterSession) -> Result<()> {
        if ctx.in_resolution() || self.principals.is_system_thread() {
            return Ok(());
        }
        if self
            .principals
            .current_principal()
            .as_ref()
            .is_some_and(Principal::is_super_user)
        {
            return Ok(());
        }
        let targets: Vec<_> = self
            .registry
            .parameterized_filters(Dimension::Location)
            .filter(|definition| self.registry.is_enabled(definition.name()))
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let scopes = self
            .resolver
            .accessible_person_ids(ctx, Dimension::Location)?;
        let AccessibleScopes::Keys(keys) = scopes else {
            return Ok(());
        };
        let bound = keys.join();
        for definition in &targets {
            session.enable_filter(definition.name());
            if let Some(parameter) = definition.parameter() {
                session.set_filter_parameter(definition.name(), parameter, &bound);
            }
        }
        debug!(
            filters = targets.len(),
            keys = keys.len(),
            "bound session filters"
        );
        Ok(())
    }
}
