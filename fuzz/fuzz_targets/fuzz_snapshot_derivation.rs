#![no_main]

// Snapshot Derivation Fuzzer
//
// Feeds arbitrary property layouts (real names, garbage names, duplicates,
// shuffled order) through the snapshot owner/type derivations and checks
// them against a straight-line re-derivation over the same pairs:
// 1. No panic for any layout.
// 2. Lookup is name-indexed and first-occurrence-wins, never positional.
// 3. Self-owned kinds ignore properties entirely.
// 4. Derivation is deterministic.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use zeolite_types::{
    EncounterId, EncounterRef, EncounterTypeId, EncounterTypeRef, EntityId, EntityKind,
    EntitySnapshot, PROPERTY_ENCOUNTER, PROPERTY_ENCOUNTER_TYPE, PROPERTY_PATIENT,
    PROPERTY_PERSON, PersonId, PropertyValue,
};

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzKind {
    Patient,
    Person,
    Visit,
    Encounter,
    Obs,
}

impl From<FuzzKind> for EntityKind {
    fn from(kind: FuzzKind) -> Self {
        match kind {
            FuzzKind::Patient => EntityKind::Patient,
            FuzzKind::Person => EntityKind::Person,
            FuzzKind::Visit => EntityKind::Visit,
            FuzzKind::Encounter => EntityKind::Encounter,
            FuzzKind::Obs => EntityKind::Obs,
        }
    }
}

#[derive(Debug, Arbitrary)]
enum FuzzName {
    Patient,
    Person,
    Encounter,
    EncounterType,
    Other(String),
}

impl FuzzName {
    fn as_str(&self) -> &str {
        match self {
            Self::Patient => PROPERTY_PATIENT,
            Self::Person => PROPERTY_PERSON,
            Self::Encounter => PROPERTY_ENCOUNTER,
            Self::EncounterType => PROPERTY_ENCOUNTER_TYPE,
            Self::Other(name) => name,
        }
    }
}

#[derive(Debug, Arbitrary)]
enum FuzzValue {
    Null,
    Person(u8),
    Encounter { id: u8, encounter_type: Option<u8> },
    EncounterType(u8),
    Text(String),
}

impl FuzzValue {
    fn to_value(&self) -> PropertyValue {
        match self {
            Self::Null => PropertyValue::Null,
            Self::Person(raw) => PropertyValue::Person(PersonId::new(u64::from(*raw))),
            Self::Encounter { id, encounter_type } => {
                let id = EncounterId::new(u64::from(*id));
                PropertyValue::Encounter(match encounter_type {
                    Some(ty) => EncounterRef::resolved(id, EncounterTypeId::new(u64::from(*ty))),
                    None => EncounterRef::new(id),
                })
            }
            Self::EncounterType(raw) => {
                PropertyValue::EncounterType(EncounterTypeId::new(u64::from(*raw)))
            }
            Self::Text(text) => PropertyValue::Text(text.clone()),
        }
    }
}

/// First occurrence of `name`, the contract of the snapshot's name index.
fn first_value<'a>(pairs: &'a [(String, PropertyValue)], name: &str) -> Option<&'a PropertyValue> {
    pairs.iter().find(|(n, _)| n == name).map(|(_, value)| value)
}

fn expected_owner(
    kind: EntityKind,
    id: EntityId,
    pairs: &[(String, PropertyValue)],
) -> Option<PersonId> {
    let property = match kind {
        EntityKind::Patient | EntityKind::Person => return Some(PersonId::new(u64::from(id))),
        EntityKind::Visit | EntityKind::Encounter => PROPERTY_PATIENT,
        EntityKind::Obs => PROPERTY_PERSON,
    };
    match first_value(pairs, property) {
        Some(PropertyValue::Person(person)) => Some(*person),
        _ => None,
    }
}

fn expected_type_ref(kind: EntityKind, pairs: &[(String, PropertyValue)]) -> EncounterTypeRef {
    match kind {
        EntityKind::Encounter => match first_value(pairs, PROPERTY_ENCOUNTER_TYPE) {
            Some(PropertyValue::EncounterType(ty)) => EncounterTypeRef::Resolved(*ty),
            _ => EncounterTypeRef::Absent,
        },
        EntityKind::Obs => match first_value(pairs, PROPERTY_ENCOUNTER) {
            Some(PropertyValue::Encounter(link)) => match link.encounter_type {
                Some(ty) => EncounterTypeRef::Resolved(ty),
                None => EncounterTypeRef::Deferred(link.id),
            },
            _ => EncounterTypeRef::Absent,
        },
        _ => EncounterTypeRef::Absent,
    }
}

fuzz_target!(|input: (FuzzKind, u16, Vec<(FuzzName, FuzzValue)>)| {
    let (kind, raw_id, layout) = input;
    let kind = EntityKind::from(kind);
    let id = EntityId::new(u64::from(raw_id));

    let mut snapshot = EntitySnapshot::new(kind, id);
    let mut pairs = Vec::with_capacity(layout.len().min(16));
    for (name, value) in layout.iter().take(16) {
        let value = value.to_value();
        snapshot = snapshot.with_property(name.as_str(), value.clone());
        pairs.push((name.as_str().to_string(), value));
    }

    // Lookup must be name-indexed, first occurrence winning.
    for (name, _) in &pairs {
        assert_eq!(snapshot.property(name), first_value(&pairs, name));
    }
    assert_eq!(snapshot.property("no_such_property"), None);

    // Owner and type derivations agree with the straight-line versions.
    assert_eq!(snapshot.owning_person_id(), expected_owner(kind, id, &pairs));
    assert_eq!(snapshot.encounter_type_ref(), expected_type_ref(kind, &pairs));

    // And are stable across calls.
    assert_eq!(snapshot.owning_person_id(), snapshot.owning_person_id());
    assert_eq!(snapshot.encounter_type_ref(), snapshot.encounter_type_ref());
});
