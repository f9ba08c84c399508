// crates/scan-manager-entities/src/tests_support.rs
// ============================================================================
// Module: Repository Test Support
// Description: Shared fixtures for repository unit tests.
// Purpose: Provide an initialized in-memory context and a session helper.
// Dependencies: crate::context, scan-manager-store
// ============================================================================

//! ## Overview
//! Unit tests run against an in-memory store initialized with the full
//! schema and seed data, wrapped in a [`Manage`] context.

#![allow(clippy::unwrap_used, reason = "Test-only helpers are permitted.")]

use scan_manager_store::Store;
use scan_manager_store::initialize;

use crate::context::Manage;

/// Opens an initialized in-memory store wrapped in a context.
pub(crate) fn initialized_manage() -> Manage {
    let mut store = Store::open_in_memory().unwrap();
    initialize(&mut store).unwrap();
    Manage::new(store)
}

/// Establishes a session as `name`, creating the user when needed.
pub(crate) fn login(manage: &mut Manage, name: &str) {
    let user = manage.ensure_user(name).unwrap();
    manage.set_user(Some(user));
}
