// crates/scan-manager-entities/src/access.rs
// ============================================================================
// Module: Shared Access Helpers
// Description: Visibility, name-uniqueness, and uniquify helpers shared by
//              every repository.
// Purpose: Keep the owner-or-global rule and per-(kind, owner) naming in
//          one place.
// Dependencies: rusqlite, scan-manager-store
// ============================================================================

//! ## Overview
//! A row is visible to the session iff its owner is NULL (global) or the
//! session user. Name uniqueness is scoped per (kind, owner) and checked
//! inside the caller's transaction. `unique_name` is the repository-layer
//! materialization of the original `uniquify` SQL callback: it returns the
//! smallest `"<name> N"` free within the scope.
//!
//! Table names passed to these helpers are compile-time constants from the
//! repository modules, never input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_store::StoreError;
use scan_manager_store::Tx;

// ============================================================================
// SECTION: Visibility
// ============================================================================

/// Resolves a uuid to a rid, honoring owner-or-global visibility. Never
/// returns the rid of a row the session does not own.
pub(crate) fn visible_rid_by_uuid(
    tx: &Tx<'_>,
    table: &str,
    uuid: &str,
    user_rid: Option<i64>,
) -> Result<Option<i64>, StoreError> {
    match user_rid {
        Some(rid) => tx.opt_i64(
            &format!(
                "SELECT rid FROM {table} WHERE uuid = ?1 AND (owner IS NULL OR owner = ?2)"
            ),
            params![uuid, rid],
        ),
        None => tx.opt_i64(
            &format!("SELECT rid FROM {table} WHERE uuid = ?1 AND owner IS NULL"),
            params![uuid],
        ),
    }
}

/// Counts rows visible to the session.
pub(crate) fn visible_count(
    tx: &Tx<'_>,
    table: &str,
    user_rid: Option<i64>,
) -> Result<i64, StoreError> {
    match user_rid {
        Some(rid) => tx.scalar_i64(
            &format!("SELECT count(*) FROM {table} WHERE owner IS NULL OR owner = ?1"),
            params![rid],
        ),
        None => tx.scalar_i64(
            &format!("SELECT count(*) FROM {table} WHERE owner IS NULL"),
            [],
        ),
    }
}

// ============================================================================
// SECTION: Naming
// ============================================================================

/// Whether `name` is taken within (kind, owner). Global rows and per-user
/// rows occupy separate scopes.
pub(crate) fn name_taken(
    tx: &Tx<'_>,
    table: &str,
    name: &str,
    owner: Option<i64>,
) -> Result<bool, StoreError> {
    let hit = match owner {
        Some(rid) => tx.opt_i64(
            &format!("SELECT 1 FROM {table} WHERE name = ?1 AND owner = ?2 LIMIT 1"),
            params![name, rid],
        )?,
        None => tx.opt_i64(
            &format!("SELECT 1 FROM {table} WHERE name = ?1 AND owner IS NULL LIMIT 1"),
            params![name],
        )?,
    };
    Ok(hit.is_some())
}

/// Returns the smallest `"<base> N"` (N >= 1) free within (kind, owner).
pub(crate) fn unique_name(
    tx: &Tx<'_>,
    table: &str,
    base: &str,
    owner: Option<i64>,
) -> Result<String, StoreError> {
    let mut suffix: i64 = 1;
    loop {
        let candidate = format!("{base} {suffix}");
        if !name_taken(tx, table, &candidate, owner)? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use rusqlite::params;
    use scan_manager_store::Store;
    use scan_manager_store::StoreError;

    use super::name_taken;
    use super::unique_name;
    use super::visible_rid_by_uuid;

    fn seeded_store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store
            .exclusive(|tx| {
                tx.exec_batch(
                    "CREATE TABLE widgets (rid INTEGER PRIMARY KEY, uuid TEXT,
                                           owner INTEGER, name TEXT);
                     INSERT INTO widgets (uuid, owner, name) VALUES ('u-global', NULL, 'shared');
                     INSERT INTO widgets (uuid, owner, name) VALUES ('u-alice', 7, 'mine');
                     INSERT INTO widgets (uuid, owner, name) VALUES ('u-bob', 8, 'mine 1');",
                )
            })
            .unwrap();
        store
    }

    #[test]
    fn visibility_is_owner_or_global() {
        let mut store = seeded_store();
        store
            .immediate(|tx| -> Result<(), StoreError> {
                assert_eq!(
                    visible_rid_by_uuid(tx, "widgets", "u-global", Some(7))?,
                    Some(1)
                );
                assert_eq!(
                    visible_rid_by_uuid(tx, "widgets", "u-alice", Some(7))?,
                    Some(2)
                );
                assert_eq!(visible_rid_by_uuid(tx, "widgets", "u-alice", Some(8))?, None);
                assert_eq!(visible_rid_by_uuid(tx, "widgets", "u-alice", None)?, None);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn name_scopes_are_per_owner() {
        let mut store = seeded_store();
        store
            .immediate(|tx| -> Result<(), StoreError> {
                assert!(name_taken(tx, "widgets", "shared", None)?);
                assert!(!name_taken(tx, "widgets", "shared", Some(7))?);
                assert!(name_taken(tx, "widgets", "mine", Some(7))?);
                assert!(!name_taken(tx, "widgets", "mine", Some(8))?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn unique_name_finds_the_smallest_free_suffix() {
        let mut store = seeded_store();
        store
            .exclusive(|tx| -> Result<(), StoreError> {
                // "mine 1" is taken for owner 8, so the next free is "mine 2".
                assert_eq!(unique_name(tx, "widgets", "mine", Some(8))?, "mine 2");
                assert_eq!(unique_name(tx, "widgets", "mine", Some(7))?, "mine 1");
                tx.exec(
                    "INSERT INTO widgets (uuid, owner, name) VALUES ('u2', 7, 'mine 1')",
                    params![],
                )?;
                assert_eq!(unique_name(tx, "widgets", "mine", Some(7))?, "mine 2");
                Ok(())
            })
            .unwrap();
    }
}
