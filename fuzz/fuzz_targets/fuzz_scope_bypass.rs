#![no_main]

// Scope Bypass Fuzzer
//
// Differential testing of the enforcement decision:
// 1. Build a small random world (roles, basis grants, person attributions,
//    restricted encounter types) and a caller.
// 2. Drive session binding and load interception over it.
// 3. Re-derive every admit/refuse decision from the grant table directly.
//
// Any disagreement between the engine and the re-derivation is a scope
// bypass (or a spurious refusal), and either one panics the target.

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use zeolite::memory::{InMemoryGrants, InMemoryPrincipals, InMemoryProperties, RecordingSession};
use zeolite::{
    AccessContext, AccessibleScopes, Dimension, EncounterId, EncounterRef, EncounterTypeId,
    EnforcementError, EngineConfig, EntityId, EntityKind, EntitySnapshot,
    FILTER_ENCOUNTER_TYPE_ENCOUNTER, FILTER_ENCOUNTER_TYPE_OBS, FILTER_LOCATION_ENCOUNTER,
    FILTER_LOCATION_OBS, FILTER_LOCATION_PATIENT, FILTER_LOCATION_PERSON, FILTER_LOCATION_VISIT,
    LocationId, PROPERTY_ENCOUNTER, PROPERTY_ENCOUNTER_TYPE, PROPERTY_PATIENT, PROPERTY_PERSON,
    PersonId, Principal, ProgramId, PropertyValue, ScopeKey, UserId, Zeolite,
};

const ROLES: [&str; 4] = ["Nurse", "Clerk", "Pharmacist", "Auditor"];
const VIEW_PRIVILEGE: &str = "View Restricted Encounters";
const FILTERS: [&str; 7] = [
    FILTER_LOCATION_PATIENT,
    FILTER_LOCATION_PERSON,
    FILTER_LOCATION_VISIT,
    FILTER_LOCATION_ENCOUNTER,
    FILTER_LOCATION_OBS,
    FILTER_ENCOUNTER_TYPE_ENCOUNTER,
    FILTER_ENCOUNTER_TYPE_OBS,
];

// ============================================================================
// World generation
// ============================================================================

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzDimension {
    Location,
    Program,
}

impl From<FuzzDimension> for Dimension {
    fn from(dimension: FuzzDimension) -> Self {
        match dimension {
            FuzzDimension::Location => Dimension::Location,
            FuzzDimension::Program => Dimension::Program,
        }
    }
}

/// One role-to-basis grant. Bases live in a space of 8 per dimension so
/// that grants, attributions, and loads actually collide.
#[derive(Debug, Arbitrary)]
struct FuzzGrant {
    role: u8,
    dimension: FuzzDimension,
    basis: u8,
}

/// One person attributed to a basis (a patient of a clinic, an enrollee
/// of a program).
#[derive(Debug, Arbitrary)]
struct FuzzAttribution {
    dimension: FuzzDimension,
    basis: u8,
    person: u8,
}

/// An encounter-id-to-type row, the table behind deferred type lookups.
#[derive(Debug, Arbitrary)]
struct FuzzEncounterRow {
    encounter: u8,
    encounter_type: u8,
}

#[derive(Debug, Arbitrary)]
enum FuzzCaller {
    Anonymous,
    User { id: u8, roles: Vec<u8>, privileged: bool },
    SuperUser { id: u8 },
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzStrictness {
    Unset,
    On,
    Off,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum FuzzEncounterLink {
    Missing,
    Null,
    Typed { encounter: u8, encounter_type: u8 },
    Untyped { encounter: u8 },
}

#[derive(Debug, Arbitrary)]
enum FuzzLoad {
    Patient { person: u8 },
    Person { person: u8 },
    Visit { patient: Option<u8> },
    Encounter { patient: Option<u8>, encounter_type: Option<u8> },
    Obs { person: Option<u8>, encounter: FuzzEncounterLink },
}

#[derive(Debug, Arbitrary)]
struct FuzzWorld {
    grants: Vec<FuzzGrant>,
    attributions: Vec<FuzzAttribution>,
    encounter_rows: Vec<FuzzEncounterRow>,
    restricted_types: Vec<u8>,
    caller: FuzzCaller,
    strictness: FuzzStrictness,
    disabled_filters: Vec<u8>,
    loads: Vec<FuzzLoad>,
}

fn person(raw: u8) -> PersonId {
    PersonId::new(u64::from(raw % 16))
}

fn encounter(raw: u8) -> EncounterId {
    EncounterId::new(u64::from(raw % 8))
}

fn encounter_type(raw: u8) -> EncounterTypeId {
    EncounterTypeId::new(u64::from(raw % 8))
}

fn role(raw: u8) -> &'static str {
    ROLES[usize::from(raw) % ROLES.len()]
}

fn build_grants(world: &FuzzWorld) -> InMemoryGrants {
    let mut grants = InMemoryGrants::new();
    for grant in world.grants.iter().take(16) {
        grants = match grant.dimension {
            FuzzDimension::Location => grants.with_basis(
                role(grant.role),
                Dimension::Location,
                LocationId::new(u64::from(grant.basis % 8)),
            ),
            FuzzDimension::Program => grants.with_basis(
                role(grant.role),
                Dimension::Program,
                ProgramId::new(u64::from(grant.basis % 8)),
            ),
        };
    }
    for attribution in world.attributions.iter().take(32) {
        grants = match attribution.dimension {
            FuzzDimension::Location => grants.with_person_at(
                Dimension::Location,
                LocationId::new(u64::from(attribution.basis % 8)),
                person(attribution.person),
            ),
            FuzzDimension::Program => grants.with_person_at(
                Dimension::Program,
                ProgramId::new(u64::from(attribution.basis % 8)),
                person(attribution.person),
            ),
        };
    }
    for row in world.encounter_rows.iter().take(8) {
        grants = grants
            .with_encounter_type(encounter(row.encounter), encounter_type(row.encounter_type));
    }
    for restricted in world.restricted_types.iter().take(4) {
        grants = grants.with_view_privilege(encounter_type(*restricted), VIEW_PRIVILEGE);
    }
    grants
}

fn build_principal(caller: &FuzzCaller) -> Option<Principal> {
    match caller {
        FuzzCaller::Anonymous => None,
        FuzzCaller::SuperUser { id } => Some(Principal::super_user(UserId::new(u64::from(*id)))),
        FuzzCaller::User { id, roles, privileged } => {
            let mut principal = Principal::new(UserId::new(u64::from(*id)));
            for raw in roles.iter().take(4) {
                principal = principal.with_role(role(*raw));
            }
            if *privileged {
                principal = principal.with_privilege(VIEW_PRIVILEGE);
            }
            Some(principal)
        }
    }
}

fn build_snapshot(load: &FuzzLoad) -> EntitySnapshot {
    match load {
        FuzzLoad::Patient { person: raw } => {
            EntitySnapshot::new(EntityKind::Patient, EntityId::new(u64::from(*raw % 16)))
        }
        FuzzLoad::Person { person: raw } => {
            EntitySnapshot::new(EntityKind::Person, EntityId::new(u64::from(*raw % 16)))
        }
        FuzzLoad::Visit { patient } => {
            let value = match patient {
                Some(raw) => PropertyValue::Person(person(*raw)),
                None => PropertyValue::Null,
            };
            EntitySnapshot::new(EntityKind::Visit, EntityId::new(900))
                .with_property(PROPERTY_PATIENT, value)
        }
        FuzzLoad::Encounter { patient, encounter_type: ty } => {
            let owner = match patient {
                Some(raw) => PropertyValue::Person(person(*raw)),
                None => PropertyValue::Null,
            };
            let ty = match ty {
                Some(raw) => PropertyValue::EncounterType(encounter_type(*raw)),
                None => PropertyValue::Null,
            };
            EntitySnapshot::new(EntityKind::Encounter, EntityId::new(901))
                .with_property(PROPERTY_PATIENT, owner)
                .with_property(PROPERTY_ENCOUNTER_TYPE, ty)
        }
        FuzzLoad::Obs { person: raw, encounter: link } => {
            let owner = match raw {
                Some(raw) => PropertyValue::Person(person(*raw)),
                None => PropertyValue::Null,
            };
            let snapshot = EntitySnapshot::new(EntityKind::Obs, EntityId::new(902))
                .with_property(PROPERTY_PERSON, owner);
            match link {
                FuzzEncounterLink::Missing => snapshot,
                FuzzEncounterLink::Null => {
                    snapshot.with_property(PROPERTY_ENCOUNTER, PropertyValue::Null)
                }
                FuzzEncounterLink::Typed { encounter: id, encounter_type: ty } => {
                    snapshot.with_property(
                        PROPERTY_ENCOUNTER,
                        PropertyValue::Encounter(EncounterRef::resolved(
                            encounter(*id),
                            encounter_type(*ty),
                        )),
                    )
                }
                FuzzEncounterLink::Untyped { encounter: id } => snapshot.with_property(
                    PROPERTY_ENCOUNTER,
                    PropertyValue::Encounter(EncounterRef::new(encounter(*id))),
                ),
            }
        }
    }
}

// ============================================================================
// Decision re-derivation
// ============================================================================

/// The encounter type a load would be checked against, re-derived from
/// the world instead of through the engine.
fn expected_type(world: &FuzzWorld, load: &FuzzLoad) -> Option<EncounterTypeId> {
    match load {
        FuzzLoad::Encounter { encounter_type: Some(raw), .. } => Some(encounter_type(*raw)),
        FuzzLoad::Obs { encounter: FuzzEncounterLink::Typed { encounter_type: raw, .. }, .. } => {
            Some(encounter_type(*raw))
        }
        // Last matching row wins, mirroring the store's overwrite-on-insert.
        FuzzLoad::Obs { encounter: FuzzEncounterLink::Untyped { encounter: id }, .. } => world
            .encounter_rows
            .iter()
            .take(8)
            .filter(|row| encounter(row.encounter) == encounter(*id))
            .next_back()
            .map(|row| encounter_type(row.encounter_type)),
        _ => None,
    }
}

fn type_is_restricted(world: &FuzzWorld, ty: EncounterTypeId) -> bool {
    world.restricted_types.iter().take(4).any(|raw| encounter_type(*raw) == ty)
}

fn caller_is_privileged(world: &FuzzWorld) -> bool {
    matches!(world.caller, FuzzCaller::User { privileged: true, .. })
}

// ============================================================================
// Invariant checking
// ============================================================================

fn check_binding(
    world: &FuzzWorld,
    engine: &Zeolite,
    ctx: &AccessContext,
    session: &RecordingSession,
) {
    if matches!(world.caller, FuzzCaller::SuperUser { .. }) {
        assert!(
            session.enabled_filters().is_empty(),
            "BYPASS: super-user session was bound with filters"
        );
        return;
    }

    let scopes = engine
        .accessible_scopes(ctx, Dimension::Location)
        .expect("in-memory stores cannot fail");
    let AccessibleScopes::Keys(keys) = scopes else {
        panic!("non-super callers must resolve to a key set");
    };
    let expected = keys.join();
    assert!(!expected.is_empty(), "resolved key sets are never empty");

    for filter in session.enabled_filters() {
        let bound = session
            .parameter_for(filter)
            .expect("every enabled filter carries its parameter");
        assert_eq!(bound, expected, "bound keys must equal the resolved scope set");
    }
}

fn check_decision(
    world: &FuzzWorld,
    engine: &Zeolite,
    ctx: &AccessContext,
    load: &FuzzLoad,
    snapshot: &EntitySnapshot,
    decision: &Result<(), EnforcementError>,
    strict: bool,
) {
    if let Err(error) = decision {
        assert!(
            matches!(error, EnforcementError::IllegalRecordAccess),
            "in-memory stores cannot fail, got {error:?}"
        );
    }

    if !strict {
        assert!(decision.is_ok(), "permissive mode must admit every load");
        return;
    }

    let kind = snapshot.kind();
    let location_active = engine.registry().is_actively_filtered(Dimension::Location, kind);
    let privilege_active = engine.registry().is_actively_filtered(Dimension::EncounterType, kind);

    if !location_active && !privilege_active {
        assert!(decision.is_ok(), "a load with no active filter was refused");
        return;
    }

    match &world.caller {
        FuzzCaller::SuperUser { .. } => {
            assert!(decision.is_ok(), "super users are never refused");
        }
        FuzzCaller::Anonymous => {
            if location_active {
                assert!(
                    decision.is_err(),
                    "BYPASS: unauthenticated caller passed a location check"
                );
            }
        }
        FuzzCaller::User { .. } => {
            let scopes = engine
                .accessible_scopes(ctx, Dimension::Location)
                .expect("in-memory stores cannot fail");
            let in_scope = snapshot
                .owning_person_id()
                .is_some_and(|owner| scopes.contains(&ScopeKey::from(owner)));

            if location_active && decision.is_ok() {
                assert!(in_scope, "BYPASS: admitted a record outside the resolved scopes");
            }
            if location_active && !privilege_active {
                assert_eq!(
                    decision.is_ok(),
                    in_scope,
                    "location decision must match the resolved scopes"
                );
            }
            if privilege_active && decision.is_ok() {
                if let Some(ty) = expected_type(world, load) {
                    if type_is_restricted(world, ty) {
                        assert!(
                            caller_is_privileged(world),
                            "BYPASS: restricted encounter type admitted without the privilege"
                        );
                    }
                }
            }
        }
    }
}

// ============================================================================
// Fuzz Target
// ============================================================================

fuzz_target!(|world: FuzzWorld| {
    let principals = Arc::new(InMemoryPrincipals::new());
    principals.set_principal(build_principal(&world.caller));

    let properties = Arc::new(InMemoryProperties::new());
    let config = EngineConfig::without_audit();
    let strict = match world.strictness {
        FuzzStrictness::Unset => true,
        FuzzStrictness::On => {
            properties.set(&config.strict_mode_property, "true");
            true
        }
        FuzzStrictness::Off => {
            properties.set(&config.strict_mode_property, "false");
            false
        }
    };

    let engine = Zeolite::new(principals, Arc::new(build_grants(&world)), properties, config);
    for raw in world.disabled_filters.iter().take(7) {
        let name = FILTERS[usize::from(*raw) % FILTERS.len()];
        engine.set_filter_enabled(name, false).expect("standard filters are registered");
    }

    let ctx = engine.new_context();
    let mut session = RecordingSession::new();

    engine.bind_session(&ctx, &mut session).expect("in-memory stores cannot fail");
    check_binding(&world, &engine, &ctx, &session);

    for load in world.loads.iter().take(8) {
        let snapshot = build_snapshot(load);
        let before = session.flush_mode();
        let decision = engine.on_entity_load(&ctx, &mut session, &snapshot);
        assert_eq!(session.flush_mode(), before, "flush mode must be restored after interception");

        // Decisions are deterministic: same world, same snapshot, same answer.
        let again = engine.on_entity_load(&ctx, &mut session, &snapshot);
        assert_eq!(decision, again, "interception must be deterministic");

        check_decision(&world, &engine, &ctx, load, &snapshot, &decision, strict);
    }
});
