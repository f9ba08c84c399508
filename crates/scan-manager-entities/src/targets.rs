// crates/scan-manager-entities/src/targets.rs
// ============================================================================
// Module: Target Repository
// Description: Accessors for scan targets.
// Purpose: Validate host lists and port ranges, enforce naming and
//          visibility, and guard deletes behind task references.
// Dependencies: crate::{access, context, outcome}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! A target binds a comma-separated host list and a port-range expression,
//! with optional login credentials for local security checks. The host
//! list is validated and counted against the scan-size bound on create and
//! modify; a target referenced by any task cannot be deleted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::EntityUuid;
use scan_manager_core::HostsError;
use scan_manager_core::count_hosts;

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

/// One target row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for predefined targets.
    pub owner: Option<i64>,
    /// Display name, unique per (kind, owner).
    pub name: String,
    /// Comma-separated host specifications.
    pub hosts: String,
    /// Free-form comment.
    pub comment: String,
    /// Credential rid for local security checks, 0 for none.
    pub lsc_credential: i64,
    /// Credential rid for SMB checks, 0 for none.
    pub smb_lsc_credential: i64,
    /// Port-range expression or the literal "default".
    pub port_range: String,
}

/// Fields for a target create.
#[derive(Debug, Clone, Default)]
pub struct NewTarget {
    /// Display name.
    pub name: String,
    /// Comma-separated host specifications.
    pub hosts: String,
    /// Free-form comment.
    pub comment: String,
    /// Uuid of the SSH credential, if any.
    pub lsc_credential: Option<String>,
    /// Uuid of the SMB credential, if any.
    pub smb_lsc_credential: Option<String>,
    /// Port-range expression; defaults to "default".
    pub port_range: Option<String>,
}

// ============================================================================
// SECTION: Port Ranges
// ============================================================================

/// Validates a port-range expression: the literal `default`, or a
/// comma-separated list of ports and `low-high` ranges, each optionally
/// prefixed `T:` or `U:` for protocol.
#[must_use]
pub fn port_range_valid(expression: &str) -> bool {
    if expression == "default" {
        return true;
    }
    if expression.is_empty() {
        return false;
    }
    expression.split(',').all(|raw| {
        let entry = raw.trim();
        let entry = entry
            .strip_prefix("T:")
            .or_else(|| entry.strip_prefix("U:"))
            .unwrap_or(entry);
        match entry.split_once('-') {
            Some((low, high)) => match (low.parse::<u16>(), high.parse::<u16>()) {
                (Ok(low), Ok(high)) => low >= 1 && low <= high,
                _ => false,
            },
            None => entry.parse::<u16>().is_ok_and(|port| port >= 1),
        }
    })
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Maps one row of the standard target projection.
fn target_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Target> {
    Ok(Target {
        rid: row.get(0)?,
        uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
        owner: row.get(2)?,
        name: row.get(3)?,
        hosts: row.get(4)?,
        comment: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        lsc_credential: row.get(6)?,
        smb_lsc_credential: row.get(7)?,
        port_range: row.get(8)?,
    })
}

/// Standard projection shared by the read paths.
const TARGET_COLUMNS: &str = "rid, uuid, owner, name, hosts, comment, lsc_credential, \
                              smb_lsc_credential, port_range";

impl Manage {
    /// Creates a target owned by the session user.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_target(&mut self, new: &NewTarget) -> Result<CreateOutcome, EntityError> {
        match count_hosts(&new.hosts) {
            Ok(_) => {}
            Err(HostsError::Invalid(_)) => return Ok(CreateOutcome::InvalidHosts),
            Err(HostsError::TooMany { .. }) => return Ok(CreateOutcome::TooManyHosts),
        }
        let port_range = new.port_range.clone().unwrap_or_else(|| "default".to_string());
        if !port_range_valid(&port_range) {
            return Ok(CreateOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        let uuid = EntityUuid::generate();
        self.store().exclusive(|tx| {
            if name_taken(tx, "targets", &new.name, user_rid)? {
                return Ok(CreateOutcome::Exists);
            }
            let mut lsc = 0;
            if let Some(credential_uuid) = &new.lsc_credential {
                match visible_rid_by_uuid(tx, "lsc_credentials", credential_uuid, user_rid)? {
                    Some(rid) => lsc = rid,
                    None => return Ok(CreateOutcome::MissingReference),
                }
            }
            let mut smb = 0;
            if let Some(credential_uuid) = &new.smb_lsc_credential {
                match visible_rid_by_uuid(tx, "lsc_credentials", credential_uuid, user_rid)? {
                    Some(rid) => smb = rid,
                    None => return Ok(CreateOutcome::MissingReference),
                }
            }
            tx.exec(
                "INSERT INTO targets (uuid, owner, name, hosts, comment, lsc_credential,
                                      smb_lsc_credential, port_range)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    uuid.as_str(),
                    user_rid,
                    new.name,
                    new.hosts,
                    new.comment,
                    lsc,
                    smb,
                    port_range
                ],
            )?;
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible target by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_target_by_uuid(&mut self, uuid: &str) -> Result<Option<Target>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "targets", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                &format!("SELECT {TARGET_COLUMNS} FROM targets WHERE rid = ?1"),
                params![rid],
                target_from_row,
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Iterates targets visible to the session, in rid order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_targets(&mut self) -> Result<Vec<Target>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| match user_rid {
            Some(rid) => tx.rows(
                &format!(
                    "SELECT {TARGET_COLUMNS} FROM targets
                     WHERE owner IS NULL OR owner = ?1 ORDER BY rid"
                ),
                params![rid],
                target_from_row,
            ),
            None => tx.rows(
                &format!(
                    "SELECT {TARGET_COLUMNS} FROM targets WHERE owner IS NULL ORDER BY rid"
                ),
                [],
                target_from_row,
            ),
        })?)
    }

    /// Counts targets visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_targets(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| visible_count(tx, "targets", user_rid))?)
    }

    /// Whether any task references the target. `None` when the uuid is not
    /// visible.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn target_in_use(&mut self, uuid: &str) -> Result<Option<bool>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "targets", uuid, user_rid)? else {
                return Ok(None);
            };
            let used =
                tx.opt_i64("SELECT 1 FROM tasks WHERE target = ?1 LIMIT 1", params![rid])?;
            Ok::<_, scan_manager_store::StoreError>(Some(used.is_some()))
        })?)
    }

    /// Modifies name, hosts, comment, or port range. Validation matches
    /// create; the name check reruns inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn modify_target(
        &mut self,
        uuid: &str,
        new: &NewTarget,
    ) -> Result<ModifyOutcome, EntityError> {
        match count_hosts(&new.hosts) {
            Ok(_) => {}
            Err(_) => return Ok(ModifyOutcome::InvalidInput),
        }
        let port_range = new.port_range.clone().unwrap_or_else(|| "default".to_string());
        if !port_range_valid(&port_range) {
            return Ok(ModifyOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "targets", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            let current_name =
                tx.scalar_string("SELECT name FROM targets WHERE rid = ?1", params![rid])?;
            if current_name != new.name && name_taken(tx, "targets", &new.name, user_rid)? {
                return Ok(ModifyOutcome::Exists);
            }
            tx.exec(
                "UPDATE targets SET name = ?1, hosts = ?2, comment = ?3, port_range = ?4
                 WHERE rid = ?5",
                params![new.name, new.hosts, new.comment, port_range, rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Deletes a target unless a task references it.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_target(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "targets", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            let used =
                tx.opt_i64("SELECT 1 FROM tasks WHERE target = ?1 LIMIT 1", params![rid])?;
            if used.is_some() {
                return Ok(DeleteOutcome::InUse);
            }
            tx.exec("DELETE FROM targets WHERE rid = ?1", params![rid])?;
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

    use super::NewTarget;
    use super::port_range_valid;
    use crate::outcome::CreateOutcome;
    use crate::outcome::DeleteOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    fn dmz_target() -> NewTarget {
        NewTarget {
            name: "DMZ".to_string(),
            hosts: "192.168.1.0/24".to_string(),
            comment: "edge segment".to_string(),
            ..NewTarget::default()
        }
    }

    #[test]
    fn create_then_delete_restores_pre_state() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let before = manage.count_targets().unwrap();
        let CreateOutcome::Created(uuid) = manage.create_target(&dmz_target()).unwrap() else {
            panic!("expected create");
        };
        assert_eq!(manage.count_targets().unwrap(), before + 1);
        assert_eq!(
            manage.delete_target(uuid.as_str()).unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(manage.count_targets().unwrap(), before);
        assert!(manage.find_target_by_uuid(uuid.as_str()).unwrap().is_none());
    }

    #[test]
    fn duplicate_names_conflict_within_owner_scope() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        assert!(matches!(
            manage.create_target(&dmz_target()).unwrap(),
            CreateOutcome::Created(_)
        ));
        assert_eq!(manage.create_target(&dmz_target()).unwrap(), CreateOutcome::Exists);
        // A different owner reuses the name freely.
        login(&mut manage, "bob");
        assert!(matches!(
            manage.create_target(&dmz_target()).unwrap(),
            CreateOutcome::Created(_)
        ));
    }

    #[test]
    fn host_validation_maps_to_specific_outcomes() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let mut bad = dmz_target();
        bad.hosts = "10.0.0.0/33".to_string();
        assert_eq!(manage.create_target(&bad).unwrap(), CreateOutcome::InvalidHosts);
        let mut wide = dmz_target();
        wide.hosts = "10.0.0.0/19".to_string();
        assert_eq!(manage.create_target(&wide).unwrap(), CreateOutcome::TooManyHosts);
    }

    #[test]
    fn missing_credential_reference_is_reported() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let mut with_credential = dmz_target();
        with_credential.lsc_credential =
            Some("99999999-9999-4999-8999-999999999999".to_string());
        assert_eq!(
            manage.create_target(&with_credential).unwrap(),
            CreateOutcome::MissingReference
        );
    }

    #[test]
    fn localhost_target_is_visible_to_everyone() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let target = manage
            .find_target_by_uuid("b493b7a8-7489-11df-a3ec-002264764cea")
            .unwrap()
            .unwrap();
        assert_eq!(target.name, "Localhost");
        assert_eq!(target.port_range, "default");
    }

    #[test]
    fn port_range_grammar() {
        assert!(port_range_valid("default"));
        assert!(port_range_valid("1-1024"));
        assert!(port_range_valid("T:21-25,U:53,8080"));
        assert!(!port_range_valid(""));
        assert!(!port_range_valid("0-10"));
        assert!(!port_range_valid("90-21"));
        assert!(!port_range_valid("webport"));
    }
}
