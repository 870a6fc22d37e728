//! # Zeolite
//!
//! Row-level access control for clinical data systems.
//!
//! Zeolite decides, record by record, what the signed-in user is allowed
//! to see. Enforcement is layered twice over the host's persistence
//! machinery:
//!
//! - **Query-time binding** - registered row filters are bound onto each
//!   session, parameterized with the person ids the user's roles reach
//! - **Load-time interception** - every entity materialized by the store
//!   is checked again, catching lazy traversals and id lookups the
//!   filters never saw
//!
//! Both layers consume one scope resolution, so they cannot disagree.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                        Zeolite                         │
//! │  ┌──────────┐    ┌────────────┐    ┌───────────────┐  │
//! │  │  Binder  │ ←─ │  Resolver  │ ─→ │  Interceptor  │  │
//! │  │(filters) │    │(role→scope)│    │ (safety net)  │  │
//! │  └──────────┘    └────────────┘    └───────────────┘  │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use zeolite::memory::{
//!     InMemoryGrants, InMemoryPrincipals, InMemoryProperties, RecordingSession,
//! };
//! use zeolite::{
//!     Dimension, EngineConfig, EntityId, EntityKind, EntitySnapshot, LocationId, PersonId,
//!     Principal, UserId, Zeolite,
//! };
//!
//! // A nurse whose role is granted the clinic, where patient 42 is seen.
//! let principals = Arc::new(InMemoryPrincipals::signed_in(
//!     Principal::new(UserId::new(1)).with_role("Nurse"),
//! ));
//! let grants = Arc::new(
//!     InMemoryGrants::new()
//!         .with_basis("Nurse", Dimension::Location, LocationId::new(1))
//!         .with_person_at(Dimension::Location, LocationId::new(1), PersonId::new(42)),
//! );
//! let engine = Zeolite::new(
//!     principals,
//!     grants,
//!     Arc::new(InMemoryProperties::new()),
//!     EngineConfig::default(),
//! );
//!
//! // One unit of work: bind the filters, then every load is checked.
//! let ctx = engine.new_context();
//! let mut session = RecordingSession::new();
//! engine.bind_session(&ctx, &mut session)?;
//!
//! let chart = EntitySnapshot::new(EntityKind::Patient, EntityId::new(42));
//! assert!(engine.on_entity_load(&ctx, &mut session, &chart).is_ok());
//!
//! let other = EntitySnapshot::new(EntityKind::Patient, EntityId::new(7));
//! assert!(engine.on_entity_load(&ctx, &mut session, &other).is_err());
//! # Ok::<(), zeolite::EnforcementError>(())
//! ```
//!
//! # Modules
//!
//! - **Engine**: [`Zeolite`], [`AccessContext`] - main API
//! - **Enforcement**: [`SessionBinder`], [`LoadInterceptor`],
//!   [`LoginLocationPolicy`]
//! - **Host seams**: [`PrincipalProvider`], [`GrantStore`],
//!   [`PropertyStore`], [`FilterSession`]
//! - **[`memory`]**: map-backed implementations of the host seams

mod backend;
mod binding;
mod config;
mod context;
mod error;
mod interceptor;
mod login;
pub mod memory;
mod registry;
mod resolver;
mod zeolite;

// Engine - main API
pub use config::EngineConfig;
pub use context::{AccessContext, ResolutionGuard};
pub use error::{EnforcementError, ILLEGAL_RECORD_ACCESS, Result};
pub use zeolite::Zeolite;

// Enforcement components, usable standalone
pub use binding::SessionBinder;
pub use interceptor::LoadInterceptor;
pub use login::LoginLocationPolicy;
pub use resolver::AccessResolver;

// Host seams
pub use backend::{
    FilterSession, FlushMode, GrantStore, PrincipalProvider, PropertyStore, StoreError,
};

// Filter registrations
pub use registry::{
    FILTER_ENCOUNTER_TYPE_ENCOUNTER, FILTER_ENCOUNTER_TYPE_OBS, FILTER_LOCATION_ENCOUNTER,
    FILTER_LOCATION_OBS, FILTER_LOCATION_PATIENT, FILTER_LOCATION_PERSON, FILTER_LOCATION_VISIT,
    FilterDefinition, FilterRegistry, PARAM_PATIENT_IDS,
};

// Re-export core types from zeolite-types
pub use zeolite_types::{
    AccessibleScopes, Dimension, EncounterId, EncounterRef, EncounterTypeId, EncounterTypeRef,
    EntityId, EntityKind, EntitySnapshot, LocationId, PROPERTY_ENCOUNTER, PROPERTY_ENCOUNTER_TYPE,
    PROPERTY_PATIENT, PROPERTY_PERSON, PersonId, Principal, PrivilegeName, ProgramId,
    PropertyValue, RoleName, ScopeKey, ScopeKeySet, UserId,
};
