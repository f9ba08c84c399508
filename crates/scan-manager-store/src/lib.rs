// crates/scan-manager-store/src/lib.rs
// ============================================================================
// Module: Scan Manager Store Library
// Description: Public API surface for the embedded store and migrator.
// Purpose: Expose the store handle, schema bootstrap, and migration chain.
// Dependencies: crate::{migrate, schema, store}
// ============================================================================

//! ## Overview
//! A single-file embedded relational store (`tasks.db`) with one writer
//! process and cooperative readers. This crate owns the connection wrapper
//! (transactions, BUSY retry, registered scalar functions and collations),
//! the current schema with its predefined seed rows, and the ordered chain
//! of version-bumping migrations.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod migrate;
pub mod schema;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use migrate::MigrateError;
pub use migrate::MigrateOutcome;
pub use migrate::SUPPORTED_VERSION;
pub use migrate::VersionStatus;
pub use migrate::backup_store;
pub use migrate::current_version;
pub use migrate::migrate;
pub use migrate::version_status;
pub use schema::initialize;
pub use store::Store;
pub use store::StoreError;
pub use store::Tx;
