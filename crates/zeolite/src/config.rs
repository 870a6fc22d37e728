//! Engine configuration.
//!
//! Configuration names the global-property keys the engine consults and
//! toggles audit logging. Property *values* are always read live from the
//! host's [`PropertyStore`](crate::PropertyStore) so that
//! administrators can flip them without restarting anything.

use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Key of the global property switching the load-time check between
    /// strict and permissive. Only the explicit value `"false"`
    /// (case-insensitive) is permissive; unset or anything else enforces.
    pub strict_mode_property: String,

    /// Key of the global property restricting selectable login locations.
    /// Unset or blank means every location is selectable.
    pub login_location_property: String,

    /// Whether binds, rejections, and administrative actions are logged.
    pub audit_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_mode_property: "zeolite.run_in_strict_mode".to_string(),
            login_location_property: "zeolite.login_location_user_property".to_string(),
            audit_enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with audit logging disabled (for testing).
    pub fn without_audit() -> Self {
        Self {
            audit_enabled: false,
            ..Self::default()
        }
    }
}
