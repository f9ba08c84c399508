// crates/scan-manager-entities/src/users.rs
// ============================================================================
// Module: User Repository
// Description: Accessors for the users relation.
// Purpose: Resolve session credentials and maintain the predefined user.
// Dependencies: crate::context, rusqlite, scan-manager-core
// ============================================================================

//! ## Overview
//! Users carry authentication identity; owner references on every other
//! entity point at `users.rid`. Authentication itself is a collaborator
//! concern; this repository only resolves and maintains the rows.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::CurrentUser;
use scan_manager_core::EntityUuid;

use crate::context::EntityError;
use crate::context::Manage;

// ============================================================================
// SECTION: Operations
// ============================================================================

impl Manage {
    /// Finds a user by login name.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_user_by_name(&mut self, name: &str) -> Result<Option<CurrentUser>, EntityError> {
        let rows = self.store().immediate(|tx| {
            tx.rows(
                "SELECT rid, uuid, name FROM users WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
        })?;
        Ok(rows.into_iter().next().map(|(rid, uuid, name)| CurrentUser {
            rid,
            uuid: EntityUuid::from_stored(uuid),
            name,
        }))
    }

    /// Finds a user by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_user_by_rid(&mut self, rid: i64) -> Result<Option<CurrentUser>, EntityError> {
        let rows = self.store().immediate(|tx| {
            tx.rows(
                "SELECT rid, uuid, name FROM users WHERE rid = ?1",
                params![rid],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
        })?;
        Ok(rows.into_iter().next().map(|(rid, uuid, name)| CurrentUser {
            rid,
            uuid: EntityUuid::from_stored(uuid),
            name,
        }))
    }

    /// Finds a user by name, creating the row when absent. Used at session
    /// establishment after external authentication succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn ensure_user(&mut self, name: &str) -> Result<CurrentUser, EntityError> {
        if let Some(user) = self.find_user_by_name(name)? {
            return Ok(user);
        }
        let uuid = EntityUuid::generate();
        let rid = self.store().exclusive(|tx| {
            tx.exec(
                "INSERT INTO users (uuid, name, password) VALUES (?1, ?2, NULL)",
                params![uuid.as_str(), name],
            )?;
            Ok::<_, EntityError>(tx.last_insert_rid())
        })?;
        Ok(CurrentUser {
            rid,
            uuid,
            name: name.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use crate::context::Manage;
    use crate::tests_support::initialized_manage;

    #[test]
    fn ensure_user_is_stable_across_calls() {
        let mut manage: Manage = initialized_manage();
        let first = manage.ensure_user("alice").unwrap();
        let second = manage.ensure_user("alice").unwrap();
        assert_eq!(first.rid, second.rid);
        assert_eq!(first.uuid, second.uuid);
    }

    #[test]
    fn the_om_user_is_predefined() {
        let mut manage: Manage = initialized_manage();
        assert!(manage.find_user_by_name("om").unwrap().is_some());
    }
}
