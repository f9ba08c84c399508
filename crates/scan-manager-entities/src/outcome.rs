// crates/scan-manager-entities/src/outcome.rs
// ============================================================================
// Module: Operation Outcomes
// Description: Typed results for mutating repository operations.
// Purpose: Carry the per-operation status codes of the control protocol as
//          enum variants instead of bare integers.
// Dependencies: scan-manager-core
// ============================================================================

//! ## Overview
//! Mutating operations report a single status the caller maps onto the
//! client protocol. Conflicts ("exists"), in-use refusals, and input
//! errors are ordinary outcomes, not `Err` values; only store failures
//! travel the error path. The `code` methods give the protocol's small
//! integer codes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use scan_manager_core::EntityUuid;

// ============================================================================
// SECTION: Create
// ============================================================================

/// Outcome of an entity create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Created; carries the fresh uuid.
    Created(EntityUuid),
    /// The name is already taken for this (kind, owner).
    Exists,
    /// A referenced entity (config, target, credential, ...) is missing.
    MissingReference,
    /// The hosts expression is malformed.
    InvalidHosts,
    /// The hosts expression expands past the host bound.
    TooManyHosts,
    /// Some other input field is out of range or unparseable.
    InvalidInput,
}

impl CreateOutcome {
    /// Protocol status code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Created(_) => 0,
            Self::Exists => 1,
            Self::InvalidHosts => 2,
            Self::TooManyHosts => 3,
            Self::MissingReference => 4,
            Self::InvalidInput => 5,
        }
    }
}

// ============================================================================
// SECTION: Modify
// ============================================================================

/// Outcome of an entity modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOutcome {
    /// Modified.
    Modified,
    /// The new name is already taken for this (kind, owner).
    Exists,
    /// No visible entity with the given uuid.
    Missing,
    /// The entity is active or otherwise not modifiable right now.
    Busy,
    /// Some input field is out of range or unparseable.
    InvalidInput,
}

impl ModifyOutcome {
    /// Protocol status code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Modified => 0,
            Self::Exists => 1,
            Self::Missing => 2,
            Self::Busy => 3,
            Self::InvalidInput => 4,
        }
    }
}

// ============================================================================
// SECTION: Delete
// ============================================================================

/// Outcome of an entity delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Deleted; pre-state is restored modulo the consumed rid.
    Deleted,
    /// The entity is referenced and the store was left unchanged.
    InUse,
    /// No visible entity with the given uuid.
    Missing,
}

impl DeleteOutcome {
    /// Protocol status code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Deleted => 0,
            Self::InUse => 1,
            Self::Missing => 2,
        }
    }
}
