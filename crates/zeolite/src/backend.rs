//! Collaborator seams between the engine and its host system.
//!
//! The engine never talks to a database, web framework, or authentication
//! stack directly. Host adapters implement these traits over whatever
//! persistence and security machinery they run on; the engine consumes them
//! through narrow, synchronous calls.

use std::fmt::Debug;

use thiserror::Error;
use zeolite_types::{
    Dimension, EncounterId, EncounterTypeId, Principal, PrivilegeName, RoleName, ScopeKey,
    ScopeKeySet,
};

/// Error from a backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store returned data the engine cannot interpret.
    #[error("malformed store data: {0}")]
    Malformed(String),
}

/// Supplies the caller identity for the current unit of work.
pub trait PrincipalProvider: Send + Sync + Debug {
    /// The authenticated principal, if any.
    fn current_principal(&self) -> Option<Principal>;

    /// True when the current execution context is a trusted system thread
    /// not bound to any end-user principal. System work is exempt from
    /// every scope check.
    fn is_system_thread(&self) -> bool;
}

/// Scope grants and access-control metadata.
///
/// Implementations may hit the persistence layer; calls are synchronous and
/// may block. The engine wraps every lookup it issues in a resolution
/// marker, so implementations are free to load entities without triggering
/// re-interception (see [`crate::AccessContext`]).
pub trait GrantStore: Send + Sync + Debug {
    /// The basis ids (locations, programs) granted to a role along a
    /// dimension. Unknown roles yield the empty set.
    fn basis_ids(&self, role: &RoleName, dimension: Dimension) -> Result<ScopeKeySet, StoreError>;

    /// Expands basis ids to the person ids attributed to those bases.
    fn person_ids_at(
        &self,
        dimension: Dimension,
        bases: &ScopeKeySet,
    ) -> Result<ScopeKeySet, StoreError>;

    /// The privilege required to view records of an encounter type.
    /// `None` means the type carries no view restriction.
    fn view_privilege(
        &self,
        encounter_type: EncounterTypeId,
    ) -> Result<Option<PrivilegeName>, StoreError>;

    /// Looks up an encounter's type by encounter id.
    fn encounter_type_of(
        &self,
        encounter: EncounterId,
    ) -> Result<Option<EncounterTypeId>, StoreError>;

    /// Records a grant of a basis to a role.
    fn grant(&self, role: &RoleName, dimension: Dimension, basis: ScopeKey)
    -> Result<(), StoreError>;

    /// Removes a grant. Revoking an absent grant is a no-op.
    fn revoke(
        &self,
        role: &RoleName,
        dimension: Dimension,
        basis: &ScopeKey,
    ) -> Result<(), StoreError>;
}

/// Global configuration properties of the host system.
pub trait PropertyStore: Send + Sync + Debug {
    /// Reads a property by key. `None` when the property is unset.
    fn property(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Flush behavior of a persistence session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlushMode {
    /// Flush pending changes whenever a query needs current state.
    #[default]
    Auto,
    /// Flush only at transaction commit.
    Commit,
    /// Flush only on explicit request.
    Manual,
}

/// The filtering surface of a persistence session.
///
/// One session belongs to one unit of work; the engine takes it by mutable
/// reference and never retains it.
pub trait FilterSession: Debug {
    /// Enables the named query-level filter. Enabling an already-enabled
    /// filter is a no-op.
    fn enable_filter(&mut self, filter: &str);

    /// Binds a parameter on an enabled filter, replacing any prior value.
    fn set_filter_parameter(&mut self, filter: &str, parameter: &str, value: &str);

    fn flush_mode(&self) -> FlushMode;

    fn set_flush_mode(&mut self, mode: FlushMode);
}
