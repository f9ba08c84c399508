// crates/scan-manager-core/src/core/identifiers.rs
// ============================================================================
// Module: Scan Manager Identifiers
// Description: Stable opaque identifiers and the session credential value.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Every user-visible entity carries a monotonically assigned integer row id
//! and a stable 36-character textual uuid. Row ids stay plain `i64` values at
//! the store boundary; the uuid gets a typed wrapper so the textual form is
//! validated exactly once, at the protocol boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Entity Uuid
// ============================================================================

/// Length of the canonical hyphenated textual uuid form.
const UUID_TEXT_LEN: usize = 36;

/// Stable opaque identifier for a user-visible entity.
///
/// # Invariants
/// - The wrapped string is always the 36-character hyphenated form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityUuid(String);

impl EntityUuid {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().as_hyphenated().to_string())
    }

    /// Parses a textual uuid, rejecting anything but the canonical form.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        if text.len() != UUID_TEXT_LEN {
            return None;
        }
        let parsed = Uuid::try_parse(text).ok()?;
        Some(Self(parsed.as_hyphenated().to_string()))
    }

    /// Wraps a string already known to be canonical (seed data, store rows).
    #[must_use]
    pub fn from_stored(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Session Credentials
// ============================================================================

/// The authenticated user a session operates as.
///
/// # Invariants
/// - `rid` refers to an existing `users` row for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    /// Row id of the user.
    pub rid: i64,
    /// Stable identifier of the user.
    pub uuid: EntityUuid,
    /// Login name of the user.
    pub name: String,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::EntityUuid;

    #[test]
    fn generate_produces_canonical_form() {
        let id = EntityUuid::generate();
        assert_eq!(id.as_str().len(), 36);
        assert!(EntityUuid::parse(id.as_str()).is_some());
    }

    #[test]
    fn parse_rejects_braced_and_short_forms() {
        assert!(EntityUuid::parse("{daba56c8-73ec-11df-a475-002264764cea}").is_none());
        assert!(EntityUuid::parse("daba56c873ec11dfa475002264764cea").is_none());
        assert!(EntityUuid::parse("").is_none());
    }

    #[test]
    fn parse_accepts_predefined_config_uuid() {
        let id = EntityUuid::parse("daba56c8-73ec-11df-a475-002264764cea").unwrap();
        assert_eq!(id.as_str(), "daba56c8-73ec-11df-a475-002264764cea");
    }
}
