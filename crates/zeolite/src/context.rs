//! Per-unit-of-work authorization state.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use zeolite_types::{AccessibleScopes, Dimension, UserId};

/// Authorization state scoped to a single unit of work.
///
/// Carries the resolution marker that breaks lookup cycles and a cache of
/// resolved scopes. A context is created when a unit of work begins and
/// dropped when it ends; cached resolutions are never trusted across that
/// boundary, so reusing a context across units of work is a correctness
/// bug on the caller's side.
///
/// # Thread Safety
///
/// Deliberately not `Sync`: a context belongs to the one thread driving
/// its unit of work. It may be moved between threads, never shared.
#[derive(Debug, Default)]
pub struct AccessContext {
    resolution_depth: Cell<u32>,
    scopes: RefCell<HashMap<(UserId, Dimension), AccessibleScopes>>,
}

impl AccessContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a scope resolution is in progress on this context.
    ///
    /// Entity loads observed in this window are the resolver's own nested
    /// lookups and are treated as already authorized; intercepting them
    /// would recurse back into resolution.
    pub fn in_resolution(&self) -> bool {
        self.resolution_depth.get() > 0
    }

    /// Marks a resolution in progress until the returned guard drops.
    ///
    /// The engine takes this marker around its own grant-store lookups.
    /// Host adapters may hold it around metadata lookups of their own that
    /// must not be re-intercepted.
    #[must_use]
    pub fn enter_resolution(&self) -> ResolutionGuard<'_> {
        self.resolution_depth.set(self.resolution_depth.get() + 1);
        ResolutionGuard {
            depth: &self.resolution_depth,
        }
    }

    pub(crate) fn cached_scopes(
        &self,
        user: UserId,
        dimension: Dimension,
    ) -> Option<AccessibleScopes> {
        self.scopes.borrow().get(&(user, dimension)).cloned()
    }

    pub(crate) fn cache_scopes(
        &self,
        user: UserId,
        dimension: Dimension,
        scopes: AccessibleScopes,
    ) {
        self.scopes.borrow_mut().insert((user, dimension), scopes);
    }
}

/// Clears the in-resolution marker when dropped, error paths included.
#[derive(Debug)]
pub struct ResolutionGuard<'a> {
    depth: &'a Cell<u32>,
}

impl Drop for ResolutionGuard<'_> {
    fn drop(&mut self) {
        debug_assert!(self.depth.get() > 0, "resolution guard dropped twice");
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}
