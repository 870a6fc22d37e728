//! In-memory backend implementations.
//!
//! Map-backed implementations of the collaborator traits, for embedding the
//! engine without a real persistence layer and for testing host adapters.
//! The engine's own test suites run against these.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use zeolite_types::{
    Dimension, EncounterId, EncounterTypeId, PersonId, Principal, PrivilegeName, RoleName,
    ScopeKey, ScopeKeySet,
};

use crate::backend::{
    FilterSession, FlushMode, GrantStore, PrincipalProvider, PropertyStore, StoreError,
};

/// Principal provider backed by a swappable slot.
///
/// Tests flip the slot between calls to model sign-in, sign-out, and
/// system-thread execution within one process.
#[derive(Debug, Default)]
pub struct InMemoryPrincipals {
    current: RwLock<Option<Principal>>,
    system_thread: AtomicBool,
}

impl InMemoryPrincipals {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider already signed in as `principal`.
    pub fn signed_in(principal: Principal) -> Self {
        Self {
            current: RwLock::new(Some(principal)),
            system_thread: AtomicBool::new(false),
        }
    }

    /// Replaces the current principal. `None` signs out.
    pub fn set_principal(&self, principal: Option<Principal>) {
        if let Ok(mut slot) = self.current.write() {
            *slot = principal;
        }
    }

    /// Marks or unmarks the current execution as system work.
    pub fn set_system_thread(&self, system: bool) {
        self.system_thread.store(system, Ordering::Relaxed);
    }
}

impl PrincipalProvider for InMemoryPrincipals {
    fn current_principal(&self) -> Option<Principal> {
        self.current.read().ok().and_then(|slot| slot.clone())
    }

    fn is_system_thread(&self) -> bool {
        self.system_thread.load(Ordering::Relaxed)
    }
}

/// Grant store holding its tables in maps.
///
/// The role-to-basis table is mutable through [`GrantStore::grant`] and
/// [`GrantStore::revoke`]; the remaining tables are fixed at construction.
#[derive(Debug, Default)]
pub struct InMemoryGrants {
    bases: RwLock<HashMap<(RoleName, Dimension), ScopeKeySet>>,
    persons_at: HashMap<(Dimension, ScopeKey), ScopeKeySet>,
    view_privileges: HashMap<EncounterTypeId, PrivilegeName>,
    encounter_types: HashMap<EncounterId, EncounterTypeId>,
}

impl InMemoryGrants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a role with a granted basis.
    pub fn with_basis(
        self,
        role: impl Into<RoleName>,
        dimension: Dimension,
        basis: impl Into<ScopeKey>,
    ) -> Self {
        if let Ok(mut bases) = self.bases.write() {
            bases
                .entry((role.into(), dimension))
                .or_default()
                .insert(basis.into());
        }
        self
    }

    /// Attributes a person to a basis along a dimension.
    pub fn with_person_at(
        mut self,
        dimension: Dimension,
        basis: impl Into<ScopeKey>,
        person: PersonId,
    ) -> Self {
        self.persons_at
            .entry((dimension, basis.into()))
            .or_default()
            .insert(ScopeKey::from(person));
        self
    }

    /// Requires a privilege to view records of an encounter type.
    pub fn with_view_privilege(
        mut self,
        encounter_type: EncounterTypeId,
        privilege: impl Into<PrivilegeName>,
    ) -> Self {
        self.view_privileges.insert(encounter_type, privilege.into());
        self
    }

    /// Records an encounter's type for later lookup by id.
    pub fn with_encounter_type(
        mut self,
        encounter: EncounterId,
        encounter_type: EncounterTypeId,
    ) -> Self {
        self.encounter_types.insert(encounter, encounter_type);
        self
    }
}

impl GrantStore for InMemoryGrants {
    fn basis_ids(&self, role: &RoleName, dimension: Dimension) -> Result<ScopeKeySet, StoreError> {
        let bases = self
            .bases
            .read()
            .map_err(|_| StoreError::Unavailable("grant table lock poisoned".to_string()))?;
        Ok(bases
            .get(&(role.clone(), dimension))
            .cloned()
            .unwrap_or_default())
    }

    fn person_ids_at(
        &self,
        dimension: Dimension,
        bases: &ScopeKeySet,
    ) -> Result<ScopeKeySet, StoreError> {
        let mut persons = ScopeKeySet::new();
        for basis in bases {
            if let Some(at) = self.persons_at.get(&(dimension, basis.clone())) {
                persons.extend(at.iter().cloned());
            }
        }
        Ok(persons)
    }

    fn view_privilege(
        &self,
        encounter_type: EncounterTypeId,
    ) -> Result<Option<PrivilegeName>, StoreError> {
        Ok(self.view_privileges.get(&encounter_type).cloned())
    }

    fn encounter_type_of(
        &self,
        encounter: EncounterId,
    ) -> Result<Option<EncounterTypeId>, StoreError> {
        Ok(self.encounter_types.get(&encounter).copied())
    }

    fn grant(
        &self,
        role: &RoleName,
        dimension: Dimension,
        basis: ScopeKey,
    ) -> Result<(), StoreError> {
        let mut bases = self
            .bases
            .write()
            .map_err(|_| StoreError::Unavailable("grant table lock poisoned".to_string()))?;
        bases.entry((role.clone(), dimension)).or_default().insert(basis);
        Ok(())
    }

    fn revoke(
        &self,
        role: &RoleName,
        dimension: Dimension,
        basis: &ScopeKey,
    ) -> Result<(), StoreError> {
        let mut bases = self
            .bases
            .write()
            .map_err(|_| StoreError::Unavailable("grant table lock poisoned".to_string()))?;
        if let Some(granted) = bases.get_mut(&(role.clone(), dimension)) {
            granted.remove(basis);
        }
        Ok(())
    }
}

/// Property store over a name/value map.
#[derive(Debug, Default)]
pub struct InMemoryProperties {
    values: RwLock<HashMap<String, String>>,
}

impl InMemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a property at construction.
    pub fn with_property(self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a property, replacing any prior value.
    pub fn set(&self, name: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(name.to_string(), value.to_string());
        }
    }

    /// Unsets a property.
    pub fn remove(&self, name: &str) {
        if let Ok(mut values) = self.values.write() {
            values.remove(name);
        }
    }
}

impl PropertyStore for InMemoryProperties {
    fn property(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self
            .values
            .read()
            .map_err(|_| StoreError::Unavailable("property table lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }
}

/// A filter parameter as bound on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParameter {
    pub filter: String,
    pub parameter: String,
    pub value: String,
}

/// Filter session that records every call made against it.
///
/// Enabling is set-like and parameter binding is last-write-wins, matching
/// the session semantics of the ORMs this engine fronts.
#[derive(Debug, Default)]
pub struct RecordingSession {
    enabled: Vec<String>,
    parameters: Vec<BoundParameter>,
    flush_mode: FlushMode,
    flush_transitions: Vec<FlushMode>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The filters enabled on this session, in first-enabled order.
    pub fn enabled_filters(&self) -> &[String] {
        &self.enabled
    }

    /// Every parameter binding in call order, including overwrites.
    pub fn bound_parameters(&self) -> &[BoundParameter] {
        &self.parameters
    }

    /// The effective value of a filter's parameter, if one was bound.
    pub fn parameter_for(&self, filter: &str) -> Option<&str> {
        self.parameters
            .iter()
            .rev()
            .find(|bound| bound.filter == filter)
            .map(|bound| bound.value.as_str())
    }

    /// Every flush-mode change in call order.
    pub fn flush_transitions(&self) -> &[FlushMode] {
        &self.flush_transitions
    }
}

impl FilterSession for RecordingSession {
    fn enable_filter(&mut self, filter: &str) {
        if !self.enabled.iter().any(|name| name == filter) {
            self.enabled.push(filter.to_string());
        }
    }

    fn set_filter_parameter(&mut self, filter: &str, parameter: &str, value: &str) {
        self.parameters.push(BoundParameter {
            filter: filter.to_string(),
            parameter: parameter.to_string(),
            value: value.to_string(),
        });
    }

    fn flush_mode(&self) -> FlushMode {
        self.flush_mode
    }

    fn set_flush_mode(&mut self, mode: FlushMode) {
        self.flush_transitions.push(mode);
        self.flush_mode = mode;
    }
}
