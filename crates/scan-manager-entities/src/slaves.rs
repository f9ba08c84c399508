// crates/scan-manager-entities/src/slaves.rs
// ============================================================================
// Module: Slave Repository
// Description: Accessors for remote manager instances.
// Purpose: Store delegation endpoints and guard deletes behind task
//          references.
// Dependencies: crate::{access, context, outcome}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! A slave names a remote manager a task may delegate its scan to. The
//! wire transport to the remote instance is a collaborator concern; this
//! repository stores host, port, and login material only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::EntityUuid;

use crate::access::name_taken;
use crate::access::visible_count;
use crate::access::visible_rid_by_uuid;
use crate::context::EntityError;
use crate::context::Manage;
use crate::outcome::CreateOutcome;
use crate::outcome::DeleteOutcome;
use crate::outcome::ModifyOutcome;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One slave row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slave {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for global slaves.
    pub owner: Option<i64>,
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Remote host.
    pub host: String,
    /// Remote port.
    pub port: i64,
    /// Login on the remote manager.
    pub login: String,
}

/// Fields for a slave create or modify.
#[derive(Debug, Clone, Default)]
pub struct NewSlave {
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Remote host.
    pub host: String,
    /// Remote port, 1-65535.
    pub port: i64,
    /// Login on the remote manager.
    pub login: String,
    /// Password for the login.
    pub password: String,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Maps one row of the standard slave projection.
fn slave_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Slave> {
    Ok(Slave {
        rid: row.get(0)?,
        uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
        owner: row.get(2)?,
        name: row.get(3)?,
        comment: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        host: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        port: row.get::<_, Option<i64>>(6)?.unwrap_or_default(),
        login: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
    })
}

impl Manage {
    /// Creates a slave owned by the session user.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_slave(&mut self, new: &NewSlave) -> Result<CreateOutcome, EntityError> {
        if new.host.is_empty() || !(1 ..= 65_535).contains(&new.port) {
            return Ok(CreateOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        let uuid = EntityUuid::generate();
        self.store().exclusive(|tx| {
            if name_taken(tx, "slaves", &new.name, user_rid)? {
                return Ok(CreateOutcome::Exists);
            }
            tx.exec(
                "INSERT INTO slaves (uuid, owner, name, comment, host, port, login, password)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    uuid.as_str(),
                    user_rid,
                    new.name,
                    new.comment,
                    new.host,
                    new.port,
                    new.login,
                    new.password
                ],
            )?;
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible slave by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_slave_by_uuid(&mut self, uuid: &str) -> Result<Option<Slave>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "slaves", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT rid, uuid, owner, name, comment, host, port, login
                 FROM slaves WHERE rid = ?1",
                params![rid],
                slave_from_row,
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Iterates slaves visible to the session, in rid order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_slaves(&mut self) -> Result<Vec<Slave>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let sql = "SELECT rid, uuid, owner, name, comment, host, port, login FROM slaves";
            match user_rid {
                Some(rid) => tx.rows(
                    &format!("{sql} WHERE owner IS NULL OR owner = ?1 ORDER BY rid"),
                    params![rid],
                    slave_from_row,
                ),
                None => tx.rows(
                    &format!("{sql} WHERE owner IS NULL ORDER BY rid"),
                    [],
                    slave_from_row,
                ),
            }
        })?)
    }

    /// Counts slaves visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_slaves(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| visible_count(tx, "slaves", user_rid))?)
    }

    /// Modifies a slave.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn modify_slave(
        &mut self,
        uuid: &str,
        new: &NewSlave,
    ) -> Result<ModifyOutcome, EntityError> {
        if new.host.is_empty() || !(1 ..= 65_535).contains(&new.port) {
            return Ok(ModifyOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "slaves", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            let current_name =
                tx.scalar_string("SELECT name FROM slaves WHERE rid = ?1", params![rid])?;
            if current_name != new.name && name_taken(tx, "slaves", &new.name, user_rid)? {
                return Ok(ModifyOutcome::Exists);
            }
            tx.exec(
                "UPDATE slaves SET name = ?1, comment = ?2, host = ?3, port = ?4,
                                   login = ?5, password = ?6
                 WHERE rid = ?7",
                params![
                    new.name,
                    new.comment,
                    new.host,
                    new.port,
                    new.login,
                    new.password,
                    rid
                ],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Whether any task delegates to the slave. `None` when the uuid is
    /// not visible.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn slave_in_use(&mut self, uuid: &str) -> Result<Option<bool>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "slaves", uuid, user_rid)? else {
                return Ok(None);
            };
            let used =
                tx.opt_i64("SELECT 1 FROM tasks WHERE slave = ?1 LIMIT 1", params![rid])?;
            Ok::<_, scan_manager_store::StoreError>(Some(used.is_some()))
        })?)
    }

    /// Deletes a slave unless a task delegates to it.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_slave(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "slaves", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            let used =
                tx.opt_i64("SELECT 1 FROM tasks WHERE slave = ?1 LIMIT 1", params![rid])?;
            if used.is_some() {
                return Ok(DeleteOutcome::InUse);
            }
            tx.exec("DELETE FROM slaves WHERE rid = ?1", params![rid])?;
            Ok::<_, EntityError>(DeleteOutcome::Deleted)
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::NewSlave;
    use crate::outcome::CreateOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    #[test]
    fn port_bounds_are_enforced() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let mut slave = NewSlave {
            name: "branch office".to_string(),
            host: "10.9.8.7".to_string(),
            port: 0,
            login: "om".to_string(),
            ..NewSlave::default()
        };
        assert_eq!(manage.create_slave(&slave).unwrap(), CreateOutcome::InvalidInput);
        slave.port = 9390;
        assert!(matches!(manage.create_slave(&slave).unwrap(), CreateOutcome::Created(_)));
    }
}
