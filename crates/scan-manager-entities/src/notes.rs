// crates/scan-manager-entities/src/notes.rs
// ============================================================================
// Module: Note Repository
// Description: Accessors for result annotations.
// Purpose: Attach commentary to results matching a scope filter.
// Dependencies: crate::{access, context, outcome}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! A note names an NVT and optionally narrows to a task, a single result,
//! a host list, a port, and a severity label. A note applies to a result
//! when every non-empty scope field matches. Notes never reassign
//! severity; that is the override's job.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::EntityUuid;
use scan_manager_core::MessageType;

use crate::access::visible_rid_by_uuid;
use crate::context::EntityError;
use crate::context::Manage;
use crate::context::unix_now;
use crate::outcome::CreateOutcome;
use crate::outcome::DeleteOutcome;
use crate::outcome::ModifyOutcome;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One note row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for global notes.
    pub owner: Option<i64>,
    /// OID of the NVT the note concerns.
    pub nvt: String,
    /// Creation time, unix seconds.
    pub creation_time: i64,
    /// Last modification time, unix seconds.
    pub modification_time: i64,
    /// Note text.
    pub text: String,
    /// Host scope; empty matches every host.
    pub hosts: String,
    /// Port scope; empty matches every port.
    pub port: String,
    /// Severity-label scope; empty matches every severity.
    pub threat: String,
    /// Task scope; 0 matches every task.
    pub task: i64,
    /// Result scope; 0 matches every result.
    pub result: i64,
}

/// Fields for a note create or modify.
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    /// OID of the NVT the note concerns.
    pub nvt: String,
    /// Note text.
    pub text: String,
    /// Host scope; empty matches every host.
    pub hosts: String,
    /// Port scope; empty matches every port.
    pub port: String,
    /// Severity-label scope; empty matches every severity.
    pub threat: String,
    /// Uuid of the task scope, if any.
    pub task: Option<String>,
    /// Uuid of the result scope, if any.
    pub result: Option<String>,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Validates the severity-label scope: empty or a known label.
fn threat_scope_valid(threat: &str) -> bool {
    threat.is_empty() || MessageType::parse(threat).is_some()
}

impl Manage {
    /// Creates a note owned by the session user.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_note(&mut self, new: &NewNote) -> Result<CreateOutcome, EntityError> {
        if new.nvt.is_empty() || !threat_scope_valid(&new.threat) {
            return Ok(CreateOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        let uuid = EntityUuid::generate();
        let now = unix_now();
        self.store().exclusive(|tx| {
            let mut task_rid = 0;
            if let Some(task_uuid) = &new.task {
                match visible_rid_by_uuid(tx, "tasks", task_uuid, user_rid)? {
                    Some(rid) => task_rid = rid,
                    None => return Ok(CreateOutcome::MissingReference),
                }
            }
            let mut result_rid = 0;
            if let Some(result_uuid) = &new.result {
                match tx
                    .opt_i64("SELECT rid FROM results WHERE uuid = ?1", params![result_uuid])?
                {
                    Some(rid) => result_rid = rid,
                    None => return Ok(CreateOutcome::MissingReference),
                }
            }
            tx.exec(
                "INSERT INTO notes (uuid, owner, nvt, creation_time, modification_time,
                                    text, hosts, port, threat, task, result)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    uuid.as_str(),
                    user_rid,
                    new.nvt,
                    now,
                    new.text,
                    new.hosts,
                    new.port,
                    new.threat,
                    task_rid,
                    result_rid
                ],
            )?;
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible note by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_note_by_uuid(&mut self, uuid: &str) -> Result<Option<Note>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "notes", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT rid, uuid, owner, nvt, creation_time, modification_time, text,
                        hosts, port, threat, task, result
                 FROM notes WHERE rid = ?1",
                params![rid],
                note_from_row,
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Iterates notes applying to one result, global first then owned, in
    /// creation order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn notes_for_result(
        &mut self,
        result_rid: i64,
        task_rid: i64,
    ) -> Result<Vec<Note>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            tx.rows(
                "SELECT notes.rid, notes.uuid, notes.owner, notes.nvt,
                        notes.creation_time, notes.modification_time, notes.text,
                        notes.hosts, notes.port, notes.threat, notes.task, notes.result
                 FROM notes, results
                 WHERE results.rid = ?1
                   AND notes.nvt = results.nvt
                   AND (notes.owner IS NULL OR notes.owner = ?2)
                   AND (notes.task = 0 OR notes.task = ?3)
                   AND (notes.result = 0 OR notes.result = results.rid)
                   AND (notes.hosts IS NULL OR notes.hosts = ''
                        OR hosts_contains(notes.hosts, results.host))
                   AND (notes.port IS NULL OR notes.port = '' OR notes.port = results.port)
                   AND (notes.threat IS NULL OR notes.threat = ''
                        OR notes.threat = results.type)
                 ORDER BY notes.owner IS NOT NULL, notes.creation_time",
                params![result_rid, user_rid, task_rid],
                note_from_row,
            )
        })?)
    }

    /// Iterates notes visible to the session, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_notes(&mut self) -> Result<Vec<Note>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let sql = "SELECT rid, uuid, owner, nvt, creation_time, modification_time,
                              text, hosts, port, threat, task, result
                       FROM notes";
            match user_rid {
                Some(rid) => tx.rows(
                    &format!("{sql} WHERE owner IS NULL OR owner = ?1 ORDER BY creation_time"),
                    params![rid],
                    note_from_row,
                ),
                None => tx.rows(
                    &format!("{sql} WHERE owner IS NULL ORDER BY creation_time"),
                    [],
                    note_from_row,
                ),
            }
        })?)
    }

    /// Counts notes visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_notes(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| crate::access::visible_count(tx, "notes", user_rid))?)
    }

    /// Modifies a note's text and scope, stamping the modification time.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn modify_note(
        &mut self,
        uuid: &str,
        new: &NewNote,
    ) -> Result<ModifyOutcome, EntityError> {
        if !threat_scope_valid(&new.threat) {
            return Ok(ModifyOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        let now = unix_now();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "notes", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            tx.exec(
                "UPDATE notes SET text = ?1, hosts = ?2, port = ?3, threat = ?4,
                                  modification_time = ?5
                 WHERE rid = ?6",
                params![new.text, new.hosts, new.port, new.threat, now, rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Deletes a note. Notes are never referenced, so delete always
    /// proceeds for a visible row.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_note(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "notes", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            tx.exec("DELETE FROM notes WHERE rid = ?1", params![rid])?;
            Ok::<_, EntityError>(DeleteOutcome::Deleted)
        })
    }
}

/// Maps one row of the standard note projection.
fn note_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        rid: row.get(0)?,
        uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
        owner: row.get(2)?,
        nvt: row.get(3)?,
        creation_time: row.get::<_, Option<i64>>(4)?.unwrap_or_default(),
        modification_time: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
        text: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        hosts: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        port: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        threat: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        task: row.get(10)?,
        result: row.get(11)?,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::NewNote;
    use crate::outcome::CreateOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    #[test]
    fn notes_round_trip_and_scope_validates() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let note = NewNote {
            nvt: "1.3.6.1.4.1.25623.1.0.10330".to_string(),
            text: "known noisy service".to_string(),
            threat: "Security Note".to_string(),
            ..NewNote::default()
        };
        let CreateOutcome::Created(uuid) = manage.create_note(&note).unwrap() else {
            panic!("expected create");
        };
        let stored = manage.find_note_by_uuid(uuid.as_str()).unwrap().unwrap();
        assert_eq!(stored.text, "known noisy service");
        assert_eq!(stored.creation_time, stored.modification_time);
        let mut bad = note;
        bad.threat = "Severe".to_string();
        assert_eq!(manage.create_note(&bad).unwrap(), CreateOutcome::InvalidInput);
    }

    #[test]
    fn note_scope_matches_the_example_result() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        // The example report carries one Security Note result on localhost.
        let (result_rid, task_rid) = manage
            .store()
            .immediate(|tx| {
                Ok::<_, scan_manager_store::StoreError>((
                    tx.scalar_i64("SELECT rid FROM results LIMIT 1", [])?,
                    tx.scalar_i64("SELECT task FROM results LIMIT 1", [])?,
                ))
            })
            .unwrap();
        let matching = NewNote {
            nvt: "1.3.6.1.4.1.25623.1.0.10330".to_string(),
            text: "matches".to_string(),
            hosts: "localhost".to_string(),
            port: "telnet (23/tcp)".to_string(),
            threat: "Security Note".to_string(),
            ..NewNote::default()
        };
        manage.create_note(&matching).unwrap();
        let off_scope = NewNote {
            nvt: "1.3.6.1.4.1.25623.1.0.10330".to_string(),
            text: "different host".to_string(),
            hosts: "10.1.1.1".to_string(),
            ..NewNote::default()
        };
        manage.create_note(&off_scope).unwrap();
        let applicable = manage.notes_for_result(result_rid, task_rid).unwrap();
        assert_eq!(applicable.len(), 1);
        assert_eq!(applicable[0].text, "matches");
    }
}
