//! Load-time interception.
//!
//! The safety net behind query-time binding: every entity the host
//! materializes from the store is presented here before it reaches the
//! caller, and loads the current principal has no scope over are refused
//! with a fixed rejection. Catches rows that arrive through paths the
//! filters never saw, lazy traversals and id lookups included.

use std::sync::Arc;

use tracing::warn;
use zeolite_types::{
    Dimension, EncounterTypeRef, EntitySnapshot, Principal, PrivilegeName, ScopeKey,
};

use crate::backend::{FilterSession, FlushMode, PrincipalProvider, PropertyStore};
use crate::config::EngineConfig;
use crate::context::AccessContext;
use crate::error::{EnforcementError, Result};
use crate::registry::FilterRegistry;
use crate::resolver::AccessResolver;

/// Checks every entity load against the current principal's scopes.
#[derive(Debug, Clone)]
pub struct LoadInterceptor {
    principals: Arc<dyn PrincipalProvider>,
    properties: Arc<dyn PropertyStore>,
    registry: Arc<FilterRegistry>,
    resolver: AccessResolver,
    strict_mode_property: String,
    audit: bool,
}

impl LoadInterceptor {
    pub fn new(
        principals: Arc<dyn PrincipalProvider>,
        properties: Arc<dyn PropertyStore>,
        registry: Arc<FilterRegistry>,
        resolver: AccessResolver,
        config: &EngineConfig,
    ) -> Self {
        Self {
            principals,
            properties,
            registry,
            resolver,
            strict_mode_property: config.strict_mode_property.clone(),
            audit: config.audit_enabled,
        }
    }

    /// Admits or refuses one entity load.
    ///
    /// System threads, super-users, loads issued while a scope resolution
    /// is in flight, and kinds registered with no filter are admitted
    /// without checks. For everything else the strict-mode property is
    /// read live; any value other than a case-insensitive `"false"`
    /// (including unset) keeps interception on. The session's flush mode
    /// is forced to [`FlushMode::Manual`] around the property read and
    /// the scope checks, and restored before returning on every path.
    ///
    /// # Errors
    ///
    /// [`EnforcementError::IllegalRecordAccess`] when the load is refused;
    /// [`EnforcementError::Store`] when a backing lookup fails.
    pub fn on_entity_load(
        &self,
        ctx: &AccessContext,
        session: &mut dyn FilterSession,
        snapshot: &EntitySnapshot,
    ) -> Result<()> {
        if self.principals.is_system_thread() || ctx.in_resolution() {
            return Ok(());
        }
        let principal = self.principals.current_principal();
        if principal.as_ref().is_some_and(Principal::is_super_user) {
            return Ok(());
        }
        let by_location = self
            .registry
            .is_registered(Dimension::Location, snapshot.kind());
        let by_privilege = self
            .registry
            .is_registered(Dimension::EncounterType, snapshot.kind());
        if !by_location && !by_privilege {
            return Ok(());
        }

        // Property and scope lookups below may query through the same
        // session; flushing the half-loaded entity mid-load must not
        // happen, so writes are held back until the checks are done.
        let _guard = FlushGuard::hold(session);
        if self.is_permissive()? {
            return Ok(());
        }
        if by_location {
            self.check_location_access(ctx, principal.as_ref(), snapshot)?;
        }
        if by_privilege {
            self.check_encounter_type_access(ctx, principal.as_ref(), snapshot)?;
        }
        Ok(())
    }

    /// True when the strict-mode property is explicitly set to `"false"`,
    /// in any case. Unset, blank, or any other value keeps checks on.
    fn is_permissive(&self) -> Result<bool> {
        let value = self.properties.property(&self.strict_mode_property)?;
        Ok(value.is_some_and(|raw| raw.eq_ignore_ascii_case("false")))
    }

    fn check_location_access(
        &self,
        ctx: &AccessContext,
        principal: Option<&Principal>,
        snapshot: &EntitySnapshot,
    ) -> Result<()> {
        if !self
            .registry
            .is_actively_filtered(Dimension::Location, snapshot.kind())
        {
            return Ok(());
        }
        if let (Some(_), Some(person)) = (principal, snapshot.owning_person_id()) {
            let scopes = self.resolver.accessible_person_ids(ctx, Dimension::Location)?;
            if scopes.contains(&ScopeKey::from(person)) {
                return Ok(());
            }
        }
        self.reject(principal, snapshot, "location")
    }

    fn check_encounter_type_access(
        &self,
        ctx: &AccessContext,
        principal: Option<&Principal>,
        snapshot: &EntitySnapshot,
    ) -> Result<()> {
        if !self
            .registry
            .is_actively_filtered(Dimension::EncounterType, snapshot.kind())
        {
            return Ok(());
        }
        let encounter_type = match snapshot.encounter_type_ref() {
            EncounterTypeRef::Absent => None,
            EncounterTypeRef::Resolved(id) => Some(id),
            EncounterTypeRef::Deferred(encounter) => {
                self.resolver.encounter_type_of(ctx, encounter)?
            }
        };
        let Some(encounter_type) = encounter_type else {
            return Ok(());
        };
        let Some(required) = self.resolver.encounter_view_privilege(ctx, encounter_type)? else {
            return Ok(());
        };
        if principal.is_some_and(|principal| principal.has_privilege(&required)) {
            return Ok(());
        }
        self.reject_for_privilege(principal, snapshot, &required)
    }

    fn reject(
        &self,
        principal: Option<&Principal>,
        snapshot: &EntitySnapshot,
        check: &str,
    ) -> Result<()> {
        if self.audit {
            warn!(
                user = ?principal.map(Principal::user_id),
                kind = %snapshot.kind(),
                entity = %snapshot.id(),
                check,
                "refused entity load"
            );
        }
        Err(EnforcementError::IllegalRecordAccess)
    }

    fn reject_for_privilege(
        &self,
        principal: Option<&Principal>,
        snapshot: &EntitySnapshot,
        required: &PrivilegeName,
    ) -> Result<()> {
        if self.audit {
            warn!(
                user = ?principal.map(Principal::user_id),
                kind = %snapshot.kind(),
                entity = %snapshot.id(),
                privilege = %required,
                "refused entity load"
            );
        }
        Err(EnforcementError::IllegalRecordAccess)
    }
}

/// Forces a session to [`FlushMode::Manual`] for the guard's lifetime and
/// restores the prior mode on drop, errors included.
struct FlushGuard<'a> {
    session: &'a mut dyn FilterSession,
    previous: FlushMode,
}

impl<'a> FlushGuard<'a> {
    fn hold(session: &'a mut dyn FilterSession) -> Self {
        let previous = session.flush_mode();
        session.set_flush_mode(FlushMode::Manual);
        Self { session, previous }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.session.set_flush_mode(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use zeolite_types::{
        EncounterId, EncounterRef, EncounterTypeId, EntityId, EntityKind, LocationId,
        PROPERTY_ENCOUNTER, PROPERTY_ENCOUNTER_TYPE, PROPERTY_PATIENT, PROPERTY_PERSON, PersonId,
        PropertyValue, UserId,
    };

    use super::*;
    use crate::memory::{InMemoryGrants, InMemoryPrincipals, InMemoryProperties, RecordingSession};
    use crate::registry::{FILTER_ENCOUNTER_TYPE_OBS, FILTER_LOCATION_VISIT};

    struct Fixture {
        interceptor: LoadInterceptor,
        principals: Arc<InMemoryPrincipals>,
        properties: Arc<InMemoryProperties>,
        registry: Arc<FilterRegistry>,
    }

    fn fixture(principal: Option<Principal>, grants: InMemoryGrants) -> Fixture {
        let principals = Arc::new(InMemoryPrincipals::new());
        principals.set_principal(principal);
        let properties = Arc::new(InMemoryProperties::new());
        let registry = Arc::new(FilterRegistry::standard());
        let resolver = AccessResolver::new(principals.clone(), Arc::new(grants));
        let interceptor = LoadInterceptor::new(
            principals.clone(),
            properties.clone(),
            registry.clone(),
            resolver,
            &EngineConfig::without_audit(),
        );
        Fixture {
            interceptor,
            principals,
            properties,
            registry,
        }
    }

    fn nurse() -> Principal {
        Principal::new(UserId::new(7)).with_role("Nurse")
    }

    fn clinic_grants() -> InMemoryGrants {
        InMemoryGrants::new()
            .with_basis("Nurse", Dimension::Location, LocationId::new(1))
            .with_person_at(Dimension::Location, LocationId::new(1), PersonId::new(100))
    }

    fn patient(id: u64) -> EntitySnapshot {
        EntitySnapshot::new(EntityKind::Patient, EntityId::new(id))
    }

    fn visit_of(person: u64) -> EntitySnapshot {
        EntitySnapshot::new(EntityKind::Visit, EntityId::new(40))
            .with_property(PROPERTY_PATIENT, PropertyValue::Person(PersonId::new(person)))
    }

    #[test]
    fn in_scope_patient_load_is_admitted() {
        let fx = fixture(Some(nurse()), clinic_grants());
        let mut session = RecordingSession::new();

        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &patient(100))
            .expect("admit");
    }

    #[test]
    fn out_of_scope_patient_load_is_refused() {
        let fx = fixture(Some(nurse()), clinic_grants());
        let mut session = RecordingSession::new();

        let result = fx
            .interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &patient(999));
        assert_eq!(result, Err(EnforcementError::IllegalRecordAccess));
        assert_eq!(result.unwrap_err().to_string(), "illegal record access");
    }

    #[test]
    fn flush_mode_is_restored_after_admission_and_refusal() {
        let fx = fixture(Some(nurse()), clinic_grants());
        let ctx = AccessContext::new();
        let mut session = RecordingSession::new();
        session.set_flush_mode(FlushMode::Commit);

        fx.interceptor
            .on_entity_load(&ctx, &mut session, &patient(100))
            .expect("admit");
        assert_eq!(session.flush_mode(), FlushMode::Commit);

        let _ = fx
            .interceptor
            .on_entity_load(&ctx, &mut session, &patient(999));
        assert_eq!(session.flush_mode(), FlushMode::Commit);
        assert!(session.flush_transitions().contains(&FlushMode::Manual));
    }

    #[test]
    fn system_threads_load_anything() {
        let fx = fixture(None, InMemoryGrants::new());
        fx.principals.set_system_thread(true);
        let mut session = RecordingSession::new();

        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &patient(999))
            .expect("admit");
        assert!(session.flush_transitions().is_empty());
    }

    #[test]
    fn super_users_load_anything() {
        let fx = fixture(Some(Principal::super_user(UserId::new(1))), InMemoryGrants::new());
        let mut session = RecordingSession::new();

        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &patient(999))
            .expect("admit");
    }

    #[test]
    fn loads_during_resolution_are_admitted() {
        let fx = fixture(Some(nurse()), InMemoryGrants::new());
        let ctx = AccessContext::new();
        let mut session = RecordingSession::new();

        let guard = ctx.enter_resolution();
        fx.interceptor
            .on_entity_load(&ctx, &mut session, &patient(999))
            .expect("admit");
        drop(guard);

        let result = fx
            .interceptor
            .on_entity_load(&ctx, &mut session, &patient(999));
        assert!(result.is_err());
    }

    #[test]
    fn unregistered_kinds_skip_the_flush_dance() {
        let registry = FilterRegistry::new([]).expect("empty registry");
        let principals = Arc::new(InMemoryPrincipals::signed_in(nurse()));
        let resolver = AccessResolver::new(principals.clone(), Arc::new(InMemoryGrants::new()));
        let interceptor = LoadInterceptor::new(
            principals,
            Arc::new(InMemoryProperties::new()),
            Arc::new(registry),
            resolver,
            &EngineConfig::without_audit(),
        );
        let mut session = RecordingSession::new();

        interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &patient(999))
            .expect("admit");
        assert!(session.flush_transitions().is_empty());
    }

    #[test]
    fn strict_mode_off_admits_out_of_scope_loads() {
        let fx = fixture(Some(nurse()), clinic_grants());
        fx.properties
            .set(&EngineConfig::default().strict_mode_property, "False");
        let mut session = RecordingSession::new();

        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &patient(999))
            .expect("admit");
        assert!(session.flush_transitions().contains(&FlushMode::Manual));
    }

    #[test_case("false", true; "plain false is permissive")]
    #[test_case("FALSE", true; "case does not matter")]
    #[test_case("true", false; "true enforces")]
    #[test_case("0", false; "zero is not false")]
    #[test_case("no", false; "no is not false")]
    #[test_case(" false ", false; "padding defeats the literal")]
    fn only_an_explicit_false_is_permissive(value: &str, admitted: bool) {
        let fx = fixture(Some(nurse()), clinic_grants());
        fx.properties
            .set(&EngineConfig::default().strict_mode_property, value);
        let mut session = RecordingSession::new();

        let result = fx
            .interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &patient(999));
        assert_eq!(result.is_ok(), admitted, "value {value:?}");
    }

    #[test]
    fn unauthenticated_location_loads_are_refused() {
        let fx = fixture(None, clinic_grants());
        let mut session = RecordingSession::new();

        let result = fx
            .interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &patient(100));
        assert!(result.is_err());
    }

    #[test]
    fn a_visit_with_no_patient_is_refused() {
        let fx = fixture(Some(nurse()), clinic_grants());
        let snapshot = EntitySnapshot::new(EntityKind::Visit, EntityId::new(40))
            .with_property(PROPERTY_PATIENT, PropertyValue::Null);
        let mut session = RecordingSession::new();

        let result = fx
            .interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &snapshot);
        assert!(result.is_err());
    }

    #[test]
    fn a_visit_of_an_accessible_patient_is_admitted() {
        let fx = fixture(Some(nurse()), clinic_grants());
        let mut session = RecordingSession::new();

        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &visit_of(100))
            .expect("admit");
    }

    #[test]
    fn disabling_the_covering_filter_admits_the_load() {
        let fx = fixture(Some(nurse()), clinic_grants());
        fx.registry
            .set_enabled(FILTER_LOCATION_VISIT, false)
            .expect("disable");
        let mut session = RecordingSession::new();

        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &visit_of(999))
            .expect("admit");
        // The kind stays registered, so the flush guard still engages.
        assert!(session.flush_transitions().contains(&FlushMode::Manual));
    }

    fn obs_in_encounter(encounter: EncounterRef) -> EntitySnapshot {
        EntitySnapshot::new(EntityKind::Obs, EntityId::new(60))
            .with_property(PROPERTY_PERSON, PropertyValue::Person(PersonId::new(100)))
            .with_property(PROPERTY_ENCOUNTER, PropertyValue::Encounter(encounter))
    }

    #[test]
    fn an_obs_outside_any_encounter_needs_no_privilege() {
        let grants = clinic_grants()
            .with_view_privilege(EncounterTypeId::new(5), "View Confidential");
        let fx = fixture(Some(nurse()), grants);
        let snapshot = EntitySnapshot::new(EntityKind::Obs, EntityId::new(60))
            .with_property(PROPERTY_PERSON, PropertyValue::Person(PersonId::new(100)))
            .with_property(PROPERTY_ENCOUNTER, PropertyValue::Null);
        let mut session = RecordingSession::new();

        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &snapshot)
            .expect("admit");
    }

    #[test]
    fn a_restricted_encounter_type_requires_its_privilege() {
        let grants = clinic_grants()
            .with_view_privilege(EncounterTypeId::new(5), "View Confidential");
        let fx = fixture(Some(nurse()), grants);
        let snapshot = EntitySnapshot::new(EntityKind::Encounter, EntityId::new(50))
            .with_property(PROPERTY_PATIENT, PropertyValue::Person(PersonId::new(100)))
            .with_property(
                PROPERTY_ENCOUNTER_TYPE,
                PropertyValue::EncounterType(EncounterTypeId::new(5)),
            );
        let mut session = RecordingSession::new();

        let result = fx
            .interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &snapshot);
        assert!(result.is_err());

        let holder = nurse().with_privilege("View Confidential");
        fx.principals.set_principal(Some(holder));
        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &snapshot)
            .expect("admit");
    }

    #[test]
    fn a_deferred_encounter_type_is_looked_up_through_the_store() {
        let grants = clinic_grants()
            .with_encounter_type(EncounterId::new(50), EncounterTypeId::new(5))
            .with_view_privilege(EncounterTypeId::new(5), "View Confidential");
        let fx = fixture(Some(nurse()), grants);
        let snapshot = obs_in_encounter(EncounterRef::new(EncounterId::new(50)));
        let mut session = RecordingSession::new();

        let result = fx
            .interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &snapshot);
        assert!(result.is_err());
    }

    #[test]
    fn an_unknown_deferred_encounter_carries_no_restriction() {
        let grants = clinic_grants()
            .with_view_privilege(EncounterTypeId::new(5), "View Confidential");
        let fx = fixture(Some(nurse()), grants);
        let snapshot = obs_in_encounter(EncounterRef::new(EncounterId::new(50)));
        let mut session = RecordingSession::new();

        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &snapshot)
            .expect("admit");
    }

    #[test]
    fn disabling_the_privilege_filter_skips_the_privilege_check() {
        let grants = clinic_grants()
            .with_encounter_type(EncounterId::new(50), EncounterTypeId::new(5))
            .with_view_privilege(EncounterTypeId::new(5), "View Confidential");
        let fx = fixture(Some(nurse()), grants);
        fx.registry
            .set_enabled(FILTER_ENCOUNTER_TYPE_OBS, false)
            .expect("disable");
        let snapshot = obs_in_encounter(EncounterRef::new(EncounterId::new(50)));
        let mut session = RecordingSession::new();

        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &snapshot)
            .expect("admit");
    }

    #[test]
    fn unauthenticated_loads_pass_unrestricted_encounter_types() {
        let grants = InMemoryGrants::new()
            .with_encounter_type(EncounterId::new(50), EncounterTypeId::new(5));
        let fx = fixture(None, grants);
        // Location filters off so only the privilege check runs.
        let names: Vec<_> = fx
            .registry
            .parameterized_filters(Dimension::Location)
            .map(|definition| definition.name().to_string())
            .collect();
        for name in &names {
            fx.registry.set_enabled(name, false).expect("disable");
        }
        let snapshot = obs_in_encounter(EncounterRef::new(EncounterId::new(50)));
        let mut session = RecordingSession::new();

        fx.interceptor
            .on_entity_load(&AccessContext::new(), &mut session, &snapshot)
            .expect("admit");
    }
}
