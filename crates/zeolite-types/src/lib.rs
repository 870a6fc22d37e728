//! # zeolite-types: Core types for `Zeolite`
//!
//! This crate contains the shared vocabulary of the `Zeolite` access
//! enforcement engine:
//! - Entity IDs ([`UserId`], [`PersonId`], [`LocationId`], [`ProgramId`],
//!   [`EncounterId`], [`EncounterTypeId`], [`EntityId`])
//! - Role and privilege names ([`RoleName`], [`PrivilegeName`])
//! - Scope keys and key sets ([`ScopeKey`], [`ScopeKeySet`])
//! - Resolved access ([`AccessibleScopes`])
//! - Restriction axes ([`Dimension`])
//! - The closed set of filtered entity kinds ([`EntityKind`])
//! - Load-time entity snapshots ([`EntitySnapshot`], [`PropertyValue`],
//!   [`EncounterRef`], [`EncounterTypeRef`])
//! - The authenticated caller ([`Principal`])
//!
//! Everything here is plain data. The decision logic that consumes these
//! types lives in the `zeolite` crate.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Entity IDs - All Copy (cheap 8-byte values)
// ============================================================================

/// Unique identifier for a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(u64);

impl UserId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<UserId> for u64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Unique identifier for a person record.
///
/// Patients are persons, so patient-scoped checks compare person ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PersonId(u64);

impl PersonId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PersonId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<PersonId> for u64 {
    fn from(id: PersonId) -> Self {
        id.0
    }
}

/// Unique identifier for a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(u64);

impl LocationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LocationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<LocationId> for u64 {
    fn from(id: LocationId) -> Self {
        id.0
    }
}

/// Unique identifier for a care program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(u64);

impl ProgramId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ProgramId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ProgramId> for u64 {
    fn from(id: ProgramId) -> Self {
        id.0
    }
}

/// Unique identifier for an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncounterId(u64);

impl EncounterId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for EncounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EncounterId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<EncounterId> for u64 {
    fn from(id: EncounterId) -> Self {
        id.0
    }
}

/// Unique identifier for an encounter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncounterTypeId(u64);

impl EncounterTypeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for EncounterTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EncounterTypeId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<EncounterTypeId> for u64 {
    fn from(id: EncounterTypeId) -> Self {
        id.0
    }
}

/// The identifier of an entity being materialized from storage.
///
/// What it names depends on the entity kind: for a `Patient` or `Person`
/// snapshot it is the person id itself, for a `Visit`/`Encounter`/`Obs`
/// snapshot it is that record's own primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

// ============================================================================
// Role and privilege names
// ============================================================================

/// The name of a role granted to a user.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleName(String);

impl RoleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoleName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for RoleName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// The name of a privilege a user may hold, directly or through roles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrivilegeName(String);

impl PrivilegeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PrivilegeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PrivilegeName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for PrivilegeName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// ============================================================================
// Scope keys - opaque record-scope identifiers
// ============================================================================

/// An opaque identifier of a record's access-control scope.
///
/// Keys compare as strings; uniqueness within a set matters, order does not.
/// Numeric ids are rendered in decimal so that a key built from an id and a
/// key parsed out of a query parameter are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// The sentinel key matching no real record.
    ///
    /// Generated query parameters must never be empty, because an empty
    /// id list is interpreted as "no restriction" by some query dialects.
    /// Sets that would otherwise be empty carry this key instead.
    pub const NO_MATCH: &'static str = "-1";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the sentinel key (see [`ScopeKey::NO_MATCH`]).
    pub fn no_match() -> Self {
        Self(Self::NO_MATCH.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_no_match(&self) -> bool {
        self.0 == Self::NO_MATCH
    }
}

impl Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<PersonId> for ScopeKey {
    fn from(id: PersonId) -> Self {
        Self(id.to_string())
    }
}

impl From<LocationId> for ScopeKey {
    fn from(id: LocationId) -> Self {
        Self(id.to_string())
    }
}

impl From<ProgramId> for ScopeKey {
    fn from(id: ProgramId) -> Self {
        Self(id.to_string())
    }
}

/// A deduplicated set of [`ScopeKey`]s.
///
/// Backed by an ordered set, so [`ScopeKeySet::join`] produces a stable
/// parameter string for a given membership. Rebinding the same resolution
/// therefore always yields the same bound value.
///
/// # Examples
///
/// ```
/// use zeolite_types::{LocationId, ScopeKey, ScopeKeySet};
///
/// let mut keys = ScopeKeySet::new();
/// keys.insert(ScopeKey::from(LocationId::new(12)));
/// keys.insert(ScopeKey::from(LocationId::new(3)));
/// keys.insert(ScopeKey::from(LocationId::new(12)));
///
/// assert_eq!(keys.len(), 2);
/// assert_eq!(keys.join(), "12,3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScopeKeySet(BTreeSet<ScopeKey>);

impl ScopeKeySet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns the singleton sentinel set `{"-1"}`.
    pub fn no_match() -> Self {
        let mut set = BTreeSet::new();
        set.insert(ScopeKey::no_match());
        Self(set)
    }

    pub fn insert(&mut self, key: ScopeKey) -> bool {
        self.0.insert(key)
    }

    pub fn remove(&mut self, key: &ScopeKey) -> bool {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &ScopeKey) -> bool {
        self.0.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if this set is exactly the no-match sentinel.
    pub fn is_no_match(&self) -> bool {
        self.0.len() == 1 && self.0.contains(&ScopeKey::no_match())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScopeKey> {
        self.0.iter()
    }

    /// Renders the set as a comma-joined parameter value.
    pub fn join(&self) -> String {
        let mut out = String::new();
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(key.as_str());
        }
        out
    }
}

impl FromIterator<ScopeKey> for ScopeKeySet {
    fn from_iter<I: IntoIterator<Item = ScopeKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<ScopeKey> for ScopeKeySet {
    fn extend<I: IntoIterator<Item = ScopeKey>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ScopeKeySet {
    type Item = ScopeKey;
    type IntoIter = std::collections::btree_set::IntoIter<ScopeKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ScopeKeySet {
    type Item = &'a ScopeKey;
    type IntoIter = std::collections::btree_set::Iter<'a, ScopeKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Accessible scopes - the result of a resolution
// ============================================================================

/// The scopes a principal may access along one dimension.
///
/// `All` is the unrestricted answer for principals exempt from scoping and
/// is deliberately distinct from any key-set encoding: an empty or sentinel
/// key set always means "matches nothing", never "matches everything".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessibleScopes {
    /// No restriction applies.
    All,
    /// Access is limited to exactly these keys.
    Keys(ScopeKeySet),
}

impl AccessibleScopes {
    /// Returns the no-match answer: a restriction that admits no record.
    pub fn no_match() -> Self {
        Self::Keys(ScopeKeySet::no_match())
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn contains(&self, key: &ScopeKey) -> bool {
        match self {
            Self::All => true,
            Self::Keys(keys) => keys.contains(key),
        }
    }
}

// ============================================================================
// Dimensions - axes of access restriction
// ============================================================================

/// An axis along which record access is restricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// Location-based patient visibility.
    Location,
    /// Program-based visibility.
    Program,
    /// Encounter-type privilege visibility.
    EncounterType,
}

impl Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location => write!(f, "location"),
            Self::Program => write!(f, "program"),
            Self::EncounterType => write!(f, "encounter-type"),
        }
    }
}

// ============================================================================
// Entity kinds - the closed set of filtered types
// ============================================================================

/// Name of the snapshot property holding a visit's or encounter's patient.
pub const PROPERTY_PATIENT: &str = "patient";
/// Name of the snapshot property holding an observation's person.
pub const PROPERTY_PERSON: &str = "person";
/// Name of the snapshot property holding an observation's encounter.
pub const PROPERTY_ENCOUNTER: &str = "encounter";
/// Name of the snapshot property holding an encounter's type.
pub const PROPERTY_ENCOUNTER_TYPE: &str = "encounter_type";

/// The closed set of entity kinds that participate in filtering.
///
/// Keeping the set closed makes every per-kind derivation exhaustive; adding
/// a kind is a compile-time event, not a runtime type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Patient,
    Person,
    Visit,
    Encounter,
    Obs,
}

impl EntityKind {
    /// The snapshot property naming this kind's owning person, if the owner
    /// is not the entity itself.
    pub fn scope_property(self) -> Option<&'static str> {
        match self {
            Self::Patient | Self::Person => None,
            Self::Visit | Self::Encounter => Some(PROPERTY_PATIENT),
            Self::Obs => Some(PROPERTY_PERSON),
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patient => write!(f, "patient"),
            Self::Person => write!(f, "person"),
            Self::Visit => write!(f, "visit"),
            Self::Encounter => write!(f, "encounter"),
            Self::Obs => write!(f, "obs"),
        }
    }
}

// ============================================================================
// Entity snapshots - what the persistence layer hands us at load time
// ============================================================================

/// A reference to an encounter held by another entity's snapshot.
///
/// The encounter type may be unresolved when the owning row was hydrated
/// without joining the encounter's own row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterRef {
    pub id: EncounterId,
    pub encounter_type: Option<EncounterTypeId>,
}

impl EncounterRef {
    pub fn new(id: EncounterId) -> Self {
        Self {
            id,
            encounter_type: None,
        }
    }

    pub fn resolved(id: EncounterId, encounter_type: EncounterTypeId) -> Self {
        Self {
            id,
            encounter_type: Some(encounter_type),
        }
    }
}

/// A single property value within an [`EntitySnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// The property is present but holds no reference.
    Null,
    /// A reference to a person (the value of `patient`/`person` properties).
    Person(PersonId),
    /// A reference to an encounter (the value of `encounter` properties).
    Encounter(EncounterRef),
    /// A reference to an encounter type.
    EncounterType(EncounterTypeId),
    /// Any other scalar this engine does not interpret.
    Text(String),
}

/// Where an entity's encounter type can be found, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncounterTypeRef {
    /// The entity carries no encounter type to check.
    Absent,
    /// The type was present in the snapshot.
    Resolved(EncounterTypeId),
    /// The entity references an encounter whose type was not hydrated;
    /// resolving it requires a lookup by this encounter id.
    Deferred(EncounterId),
}

/// A property-name-indexed view of an entity being materialized.
///
/// The persistence layer supplies property names and values as parallel
/// sequences. The name-to-position mapping is authoritative: lookups always
/// go through the supplied names and never assume a fixed layout.
///
/// # Examples
///
/// ```
/// use zeolite_types::{
///     EntityId, EntityKind, EntitySnapshot, PersonId, PropertyValue, PROPERTY_PATIENT,
/// };
///
/// let snapshot = EntitySnapshot::new(EntityKind::Visit, EntityId::new(40))
///     .with_property("voided", PropertyValue::Text("false".to_string()))
///     .with_property(PROPERTY_PATIENT, PropertyValue::Person(PersonId::new(7)));
///
/// assert_eq!(snapshot.owning_person_id(), Some(PersonId::new(7)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    kind: EntityKind,
    id: EntityId,
    property_names: Vec<String>,
    values: Vec<PropertyValue>,
}

impl EntitySnapshot {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        Self {
            kind,
            id,
            property_names: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Appends a named property. Builder-style, used by host adapters and
    /// tests to assemble a snapshot in whatever order the persistence layer
    /// reports its columns.
    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.property_names.push(name.into());
        self.values.push(value);
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Looks up a property value by name via the supplied name index.
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        let index = self.property_names.iter().position(|n| n == name)?;
        self.values.get(index)
    }

    /// Derives the person id owning this entity's location scope.
    ///
    /// `Patient` and `Person` rows own themselves; the other kinds name
    /// their owner through a property. Returns `None` when the owning
    /// reference is missing or null, which callers must treat as
    /// out-of-scope rather than unrestricted.
    pub fn owning_person_id(&self) -> Option<PersonId> {
        match self.kind.scope_property() {
            None => Some(PersonId::new(u64::from(self.id))),
            Some(property) => match self.property(property) {
                Some(PropertyValue::Person(person)) => Some(*person),
                _ => None,
            },
        }
    }

    /// Derives where this entity's encounter type can be found.
    ///
    /// Encounters carry their type directly. Observations reach it through
    /// their encounter reference; an observation without an encounter has
    /// nothing to check, and one whose encounter was hydrated without its
    /// type defers to a lookup by encounter id.
    pub fn encounter_type_ref(&self) -> EncounterTypeRef {
        match self.kind {
            EntityKind::Encounter => match self.property(PROPERTY_ENCOUNTER_TYPE) {
                Some(PropertyValue::EncounterType(ty)) => EncounterTypeRef::Resolved(*ty),
                _ => EncounterTypeRef::Absent,
            },
            EntityKind::Obs => match self.property(PROPERTY_ENCOUNTER) {
                Some(PropertyValue::Encounter(enc)) => match enc.encounter_type {
                    Some(ty) => EncounterTypeRef::Resolved(ty),
                    None => EncounterTypeRef::Deferred(enc.id),
                },
                _ => EncounterTypeRef::Absent,
            },
            EntityKind::Patient | EntityKind::Person | EntityKind::Visit => {
                EncounterTypeRef::Absent
            }
        }
    }
}

// ============================================================================
// Principal - the authenticated caller
// ============================================================================

/// The authenticated user on whose behalf records are being read.
///
/// Established by authentication and read-only to the enforcement engine.
/// An unauthenticated caller is represented by the absence of a principal,
/// not by an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    user_id: UserId,
    super_user: bool,
    roles: BTreeSet<RoleName>,
    privileges: BTreeSet<PrivilegeName>,
}

impl Principal {
    /// Creates an ordinary principal with no roles and no privileges.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            super_user: false,
            roles: BTreeSet::new(),
            privileges: BTreeSet::new(),
        }
    }

    /// Creates a super-user principal, exempt from every scope check.
    pub fn super_user(user_id: UserId) -> Self {
        Self {
            user_id,
            super_user: true,
            roles: BTreeSet::new(),
            privileges: BTreeSet::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<RoleName>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn with_privilege(mut self, privilege: impl Into<PrivilegeName>) -> Self {
        self.privileges.insert(privilege.into());
        self
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_super_user(&self) -> bool {
        self.super_user
    }

    /// The principal's effective roles, direct and inherited alike; role
    /// flattening happens upstream in the authentication layer.
    pub fn roles(&self) -> &BTreeSet<RoleName> {
        &self.roles
    }

    pub fn has_privilege(&self, privilege: &PrivilegeName) -> bool {
        self.privileges.contains(privilege)
    }
}
