//! Filter registrations and their enable/disable state.
//!
//! The registry is the process-wide table answering two questions: which
//! named filters apply to a given entity kind along a given dimension, and
//! is a given filter currently enabled. It is built explicitly at startup
//! and handed to the components that consult it; the only mutation after
//! construction is the administrative enable/disable switch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use zeolite_types::{Dimension, EntityKind};

use crate::error::{EnforcementError, Result};

/// Location-dimension filter over patient records.
pub const FILTER_LOCATION_PATIENT: &str = "location_based_patient";
/// Location-dimension filter over person records.
pub const FILTER_LOCATION_PERSON: &str = "location_based_person";
/// Location-dimension filter over visit records.
pub const FILTER_LOCATION_VISIT: &str = "location_based_visit";
/// Location-dimension filter over encounter records.
pub const FILTER_LOCATION_ENCOUNTER: &str = "location_based_encounter";
/// Location-dimension filter over observation records.
pub const FILTER_LOCATION_OBS: &str = "location_based_obs";
/// Encounter-type privilege filter over encounter records.
pub const FILTER_ENCOUNTER_TYPE_ENCOUNTER: &str = "encounter_type_privilege_encounter";
/// Encounter-type privilege filter over observation records.
pub const FILTER_ENCOUNTER_TYPE_OBS: &str = "encounter_type_privilege_obs";

/// Query parameter carrying the comma-joined accessible person ids.
pub const PARAM_PATIENT_IDS: &str = "patient_ids";

/// One filter registration: a name, the dimension it restricts, the entity
/// kinds it applies to, and the query parameter it binds, if any.
///
/// Filters without a parameter exist only for the load-time check (the
/// encounter-type privilege filters have no per-session parameter; their
/// decision needs the caller's privileges, not a bound id list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDefinition {
    name: String,
    dimension: Dimension,
    kinds: BTreeSet<EntityKind>,
    parameter: Option<String>,
}

impl FilterDefinition {
    pub fn new(name: impl Into<String>, dimension: Dimension) -> Self {
        Self {
            name: name.into(),
            dimension,
            kinds: BTreeSet::new(),
            parameter: None,
        }
    }

    /// Adds an entity kind this filter applies to.
    pub fn for_kind(mut self, kind: EntityKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Declares the query parameter this filter binds at session time.
    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn applies_to(&self, kind: EntityKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.kinds.iter().copied()
    }

    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }
}

/// The registration table plus per-filter enabled flags.
///
/// Reads happen on every request thread; writes only on administrative
/// calls. The registration table itself is immutable after construction,
/// so only the flags sit behind a lock.
#[derive(Debug)]
pub struct FilterRegistry {
    definitions: BTreeMap<String, FilterDefinition>,
    enabled: RwLock<HashMap<String, bool>>,
}

impl FilterRegistry {
    /// Builds a registry from explicit definitions.
    ///
    /// # Errors
    ///
    /// Returns [`EnforcementError::DuplicateFilter`] when two definitions
    /// share a name. Misregistration is a deployment bug and must surface
    /// at startup, not at request time.
    pub fn new(definitions: impl IntoIterator<Item = FilterDefinition>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for definition in definitions {
            let name = definition.name().to_string();
            if table.insert(name.clone(), definition).is_some() {
                return Err(EnforcementError::DuplicateFilter(name));
            }
        }
        Ok(Self::from_table(table))
    }

    /// The shipped registration set: location-based filters over patient,
    /// person, visit, encounter, and observation records, plus
    /// encounter-type privilege filters over encounters and observations.
    pub fn standard() -> Self {
        let location = [
            (FILTER_LOCATION_PATIENT, EntityKind::Patient),
            (FILTER_LOCATION_PERSON, EntityKind::Person),
            (FILTER_LOCATION_VISIT, EntityKind::Visit),
            (FILTER_LOCATION_ENCOUNTER, EntityKind::Encounter),
            (FILTER_LOCATION_OBS, EntityKind::Obs),
        ];
        let privilege = [
            (FILTER_ENCOUNTER_TYPE_ENCOUNTER, EntityKind::Encounter),
            (FILTER_ENCOUNTER_TYPE_OBS, EntityKind::Obs),
        ];

        let mut table = BTreeMap::new();
        for (name, kind) in location {
            table.insert(
                name.to_string(),
                FilterDefinition::new(name, Dimension::Location)
                    .for_kind(kind)
                    .with_parameter(PARAM_PATIENT_IDS),
            );
        }
        for (name, kind) in privilege {
            table.insert(
                name.to_string(),
                FilterDefinition::new(name, Dimension::EncounterType).for_kind(kind),
            );
        }
        Self::from_table(table)
    }

    fn from_table(table: BTreeMap<String, FilterDefinition>) -> Self {
        let enabled = table.keys().map(|name| (name.clone(), true)).collect();
        Self {
            definitions: table,
            enabled: RwLock::new(enabled),
        }
    }

    pub fn definitions(&self) -> impl Iterator<Item = &FilterDefinition> {
        self.definitions.values()
    }

    pub fn definition(&self, name: &str) -> Option<&FilterDefinition> {
        self.definitions.get(name)
    }

    /// True when the named filter is registered and enabled.
    /// Filters default to enabled; unregistered names are never enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled
            .read()
            .is_ok_and(|flags| flags.get(name).copied().unwrap_or(false))
    }

    /// Enables or disables a filter by name.
    ///
    /// # Errors
    ///
    /// Returns [`EnforcementError::UnknownFilter`] for names that were
    /// never registered.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        if !self.definitions.contains_key(name) {
            return Err(EnforcementError::UnknownFilter(name.to_string()));
        }
        let mut flags = self
            .enabled
            .write()
            .map_err(|_| EnforcementError::internal("filter flag lock poisoned"))?;
        flags.insert(name.to_string(), enabled);
        Ok(())
    }

    /// True when any filter of this dimension is registered for the kind,
    /// enabled or not.
    pub fn is_registered(&self, dimension: Dimension, kind: EntityKind) -> bool {
        self.filters_for(dimension, kind).next().is_some()
    }

    /// True when at least one enabled filter of this dimension applies to
    /// the kind. A kind whose filters are all disabled is not checked.
    pub fn is_actively_filtered(&self, dimension: Dimension, kind: EntityKind) -> bool {
        self.filters_for(dimension, kind)
            .any(|definition| self.is_enabled(definition.name()))
    }

    /// The filters of a dimension that bind a query parameter.
    pub fn parameterized_filters(
        &self,
        dimension: Dimension,
    ) -> impl Iterator<Item = &FilterDefinition> {
        self.definitions.values().filter(move |definition| {
            definition.dimension() == dimension && definition.parameter().is_some()
        })
    }

    /// The entity kinds participating in a dimension, with the filter
    /// names covering each. Introspection view for administrative callers.
    pub fn classes_filtered_by(
        &self,
        dimension: Dimension,
    ) -> BTreeMap<EntityKind, BTreeSet<String>> {
        let mut classes: BTreeMap<EntityKind, BTreeSet<String>> = BTreeMap::new();
        for definition in self
            .definitions
            .values()
            .filter(|definition| definition.dimension() == dimension)
        {
            for kind in definition.kinds() {
                classes
                    .entry(kind)
                    .or_default()
                    .insert(definition.name().to_string());
            }
        }
        classes
    }

    fn filters_for(
        &self,
        dimension: Dimension,
        kind: EntityKind,
    ) -> impl Iterator<Item = &FilterDefinition> {
        self.definitions.values().filter(move |definition| {
            definition.dimension() == dimension && definition.applies_to(kind)
        })
    }
}
