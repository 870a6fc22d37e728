//! End-to-end enforcement scenarios through the engine facade.
//!
//! Exercises the layered design as a host would drive it: filters bound at
//! query time, every materialized entity checked at load time, both layers
//! fed by one scope resolution.

use std::sync::Arc;

use zeolite::memory::{InMemoryGrants, InMemoryPrincipals, InMemoryProperties, RecordingSession};
use zeolite::{
    Dimension, EncounterId, EncounterRef, EncounterTypeId, EnforcementError, EngineConfig,
    EntityId, EntityKind, EntitySnapshot, FILTER_LOCATION_PATIENT, FilterRegistry, FilterSession,
    FlushMode,
    LocationId, PROPERTY_ENCOUNTER, PROPERTY_PERSON, PersonId, Principal, PropertyStore,
    PropertyValue, RoleName, ScopeKey, StoreError, UserId, Zeolite,
};

struct Clinic {
    engine: Zeolite,
    principals: Arc<InMemoryPrincipals>,
    properties: Arc<InMemoryProperties>,
}

/// Two wards; the Nurse role is granted ward 1 only, which patients 100
/// and 101 attend. Patient 200 attends ward 2.
fn clinic() -> Clinic {
    let principals = Arc::new(InMemoryPrincipals::new());
    let properties = Arc::new(InMemoryProperties::new());
    let grants = InMemoryGrants::new()
        .with_basis("Nurse", Dimension::Location, LocationId::new(1))
        .with_person_at(Dimension::Location, LocationId::new(1), PersonId::new(100))
        .with_person_at(Dimension::Location, LocationId::new(1), PersonId::new(101))
        .with_person_at(Dimension::Location, LocationId::new(2), PersonId::new(200))
        .with_encounter_type(EncounterId::new(50), EncounterTypeId::new(5))
        .with_view_privilege(EncounterTypeId::new(5), "View Confidential");
    let engine = Zeolite::new(
        principals.clone(),
        Arc::new(grants),
        properties.clone(),
        EngineConfig::without_audit(),
    );
    Clinic {
        engine,
        principals,
        properties,
    }
}

fn nurse() -> Principal {
    Principal::new(UserId::new(7)).with_role("Nurse")
}

fn patient(id: u64) -> EntitySnapshot {
    EntitySnapshot::new(EntityKind::Patient, EntityId::new(id))
}

#[test]
fn filters_and_interceptor_enforce_the_same_scope() {
    let clinic = clinic();
    clinic.principals.set_principal(Some(nurse()));
    let ctx = clinic.engine.new_context();
    let mut session = RecordingSession::new();

    clinic.engine.bind_session(&ctx, &mut session).expect("bind");
    assert_eq!(
        session.parameter_for(FILTER_LOCATION_PATIENT),
        Some("100,101")
    );

    clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(100))
        .expect("in-scope load");
    let refused = clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(200));
    assert_eq!(refused, Err(EnforcementError::IllegalRecordAccess));
}

#[test]
fn an_unauthenticated_session_is_bound_to_the_no_match_sentinel() {
    let clinic = clinic();
    let ctx = clinic.engine.new_context();
    let mut session = RecordingSession::new();

    clinic.engine.bind_session(&ctx, &mut session).expect("bind");
    assert_eq!(
        session.parameter_for(FILTER_LOCATION_PATIENT),
        Some(ScopeKey::NO_MATCH)
    );

    let refused = clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(100));
    assert!(refused.is_err());
}

#[test]
fn system_threads_bypass_both_layers() {
    let clinic = clinic();
    clinic.principals.set_system_thread(true);
    let ctx = clinic.engine.new_context();
    let mut session = RecordingSession::new();

    clinic.engine.bind_session(&ctx, &mut session).expect("bind");
    assert!(session.enabled_filters().is_empty());

    clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(200))
        .expect("system work loads anything");
}

#[test]
fn super_users_bypass_both_layers() {
    let clinic = clinic();
    clinic
        .principals
        .set_principal(Some(Principal::super_user(UserId::new(1))));
    let ctx = clinic.engine.new_context();
    let mut session = RecordingSession::new();

    clinic.engine.bind_session(&ctx, &mut session).expect("bind");
    assert!(session.enabled_filters().is_empty());

    clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(200))
        .expect("super user loads anything");

    // The bypass outranks the encounter-type privilege the super user lacks.
    let obs = EntitySnapshot::new(EntityKind::Obs, EntityId::new(60))
        .with_property(PROPERTY_PERSON, PropertyValue::Person(PersonId::new(100)))
        .with_property(
            PROPERTY_ENCOUNTER,
            PropertyValue::Encounter(EncounterRef::new(EncounterId::new(50))),
        );
    clinic
        .engine
        .on_entity_load(&ctx, &mut session, &obs)
        .expect("privilege checks never reach a super user");
}

#[test]
fn strict_mode_off_disables_the_interceptor_but_not_the_binding() {
    let clinic = clinic();
    clinic.principals.set_principal(Some(nurse()));
    clinic
        .properties
        .set(&clinic.engine.config().strict_mode_property, "false");
    let ctx = clinic.engine.new_context();
    let mut session = RecordingSession::new();

    clinic.engine.bind_session(&ctx, &mut session).expect("bind");
    assert_eq!(
        session.parameter_for(FILTER_LOCATION_PATIENT),
        Some("100,101")
    );

    clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(200))
        .expect("interceptor stands down in permissive mode");
}

#[test]
fn flush_mode_survives_admissions_and_refusals() {
    let clinic = clinic();
    clinic.principals.set_principal(Some(nurse()));
    let ctx = clinic.engine.new_context();
    let mut session = RecordingSession::new();
    session.set_flush_mode(FlushMode::Commit);

    clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(100))
        .expect("admit");
    assert_eq!(session.flush_mode(), FlushMode::Commit);

    let _ = clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(200));
    assert_eq!(session.flush_mode(), FlushMode::Commit);
    assert!(session.flush_transitions().contains(&FlushMode::Manual));
}

#[derive(Debug)]
struct FailingProperties;

impl PropertyStore for FailingProperties {
    fn property(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("property db down".to_string()))
    }
}

#[test]
fn a_store_failure_mid_check_still_restores_the_flush_mode() {
    let principals = Arc::new(InMemoryPrincipals::signed_in(nurse()));
    let engine = Zeolite::new(
        principals,
        Arc::new(InMemoryGrants::new()),
        Arc::new(FailingProperties),
        EngineConfig::without_audit(),
    );
    let ctx = engine.new_context();
    let mut session = RecordingSession::new();
    session.set_flush_mode(FlushMode::Commit);

    let result = engine.on_entity_load(&ctx, &mut session, &patient(100));

    assert!(matches!(result, Err(EnforcementError::Store(_))));
    assert_eq!(session.flush_mode(), FlushMode::Commit);
}

#[test]
fn nested_loads_during_resolution_are_admitted() {
    let clinic = clinic();
    clinic.principals.set_principal(Some(nurse()));
    let ctx = clinic.engine.new_context();
    let mut session = RecordingSession::new();

    // A grant-store adapter answering a resolution may itself load rows.
    let guard = ctx.enter_resolution();
    clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(200))
        .expect("loads issued by the resolver are not re-checked");
    drop(guard);

    let refused = clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(200));
    assert!(refused.is_err());
}

#[test]
fn grants_widen_and_revocations_narrow_scope_for_new_units_of_work() {
    let clinic = clinic();
    clinic.principals.set_principal(Some(nurse()));
    let before = clinic.engine.new_context();
    let mut session = RecordingSession::new();
    clinic
        .engine
        .on_entity_load(&before, &mut session, &patient(200))
        .expect_err("ward 2 starts out of scope");

    clinic
        .engine
        .grant_access(
            &RoleName::new("Nurse"),
            Dimension::Location,
            ScopeKey::from(LocationId::new(2)),
        )
        .expect("grant");

    // The open unit of work keeps the scope it resolved.
    clinic
        .engine
        .on_entity_load(&before, &mut session, &patient(200))
        .expect_err("cached scope is stable within a context");

    let after = clinic.engine.new_context();
    clinic
        .engine
        .on_entity_load(&after, &mut session, &patient(200))
        .expect("newly granted ward is in scope");

    clinic
        .engine
        .revoke_access(
            &RoleName::new("Nurse"),
            Dimension::Location,
            &ScopeKey::from(LocationId::new(2)),
        )
        .expect("revoke");
    let narrowed = clinic.engine.new_context();
    clinic
        .engine
        .on_entity_load(&narrowed, &mut session, &patient(200))
        .expect_err("revoked ward is out of scope again");
}

#[test]
fn disabling_a_filter_stops_its_enforcement() {
    let clinic = clinic();
    clinic.principals.set_principal(Some(nurse()));
    clinic
        .engine
        .set_filter_enabled(FILTER_LOCATION_PATIENT, false)
        .expect("disable");
    let ctx = clinic.engine.new_context();
    let mut session = RecordingSession::new();

    clinic.engine.bind_session(&ctx, &mut session).expect("bind");
    assert!(!session.enabled_filters().contains(&FILTER_LOCATION_PATIENT.to_string()));

    clinic
        .engine
        .on_entity_load(&ctx, &mut session, &patient(200))
        .expect("unfiltered kinds load freely");
}

#[test]
fn encounter_type_privileges_guard_obs_reached_by_lazy_paths() {
    let clinic = clinic();
    clinic.principals.set_principal(Some(nurse()));
    // An obs hydrated without its encounter's type, as lazy loading leaves it.
    let obs = EntitySnapshot::new(EntityKind::Obs, EntityId::new(60))
        .with_property(PROPERTY_PERSON, PropertyValue::Person(PersonId::new(100)))
        .with_property(
            PROPERTY_ENCOUNTER,
            PropertyValue::Encounter(EncounterRef::new(EncounterId::new(50))),
        );
    let ctx = clinic.engine.new_context();
    let mut session = RecordingSession::new();

    let refused = clinic.engine.on_entity_load(&ctx, &mut session, &obs);
    assert_eq!(refused, Err(EnforcementError::IllegalRecordAccess));

    clinic
        .principals
        .set_principal(Some(nurse().with_privilege("View Confidential")));
    let privileged = clinic.engine.new_context();
    clinic
        .engine
        .on_entity_load(&privileged, &mut session, &obs)
        .expect("privilege holder reads the restricted type");
}

#[test]
fn a_custom_registry_limits_what_the_engine_touches() {
    let principals = Arc::new(InMemoryPrincipals::signed_in(nurse()));
    let engine = Zeolite::with_registry(
        principals,
        Arc::new(InMemoryGrants::new()),
        Arc::new(InMemoryProperties::new()),
        EngineConfig::without_audit(),
        FilterRegistry::new([]).expect("empty registry"),
    );
    let ctx = engine.new_context();
    let mut session = RecordingSession::new();

    engine.bind_session(&ctx, &mut session).expect("bind");
    assert!(session.enabled_filters().is_empty());
    assert!(session.flush_transitions().is_empty());

    engine
        .on_entity_load(&ctx, &mut session, &patient(999))
        .expect("nothing registered, nothing enforced");
}
