// crates/scan-manager-entities/src/overrides.rs
// ============================================================================
// Module: Override Repository and Severity Resolver
// Description: Overrides reassign effective severity; the resolver applies
//              the first matching override per result.
// Purpose: Provide effective-severity computation, task threat aggregation,
//          and trend derivation.
// Dependencies: crate::{access, context, outcome}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! An override is a note that also carries a replacement severity. For a
//! result, the first matching override ordered by `(result DESC, task
//! DESC, port DESC, threat severity-first)` wins; its `new_threat`
//! becomes the effective severity, raw type otherwise. The task threat
//! level is the maximum effective severity over the most recent completed
//! report; the trend compares the last two completed reports.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::EntityUuid;
use scan_manager_core::MessageType;
use scan_manager_core::RunStatus;
use scan_manager_core::ThreatLevel;
use scan_manager_store::StoreError;
use scan_manager_store::Tx;

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

/// One override row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for global overrides.
    pub owner: Option<i64>,
    /// OID of the NVT the override concerns.
    pub nvt: String,
    /// Creation time, unix seconds.
    pub creation_time: i64,
    /// Last modification time, unix seconds.
    pub modification_time: i64,
    /// Override text.
    pub text: String,
    /// Host scope; empty matches every host.
    pub hosts: String,
    /// Port scope; empty matches every port.
    pub port: String,
    /// Severity-label scope; empty matches every severity.
    pub threat: String,
    /// Replacement severity label.
    pub new_threat: String,
    /// Task scope; 0 matches every task.
    pub task: i64,
    /// Result scope; 0 matches every result.
    pub result: i64,
}

/// Fields for an override create or modify.
#[derive(Debug, Clone, Default)]
pub struct NewOverride {
    /// OID of the NVT the override concerns.
    pub nvt: String,
    /// Override text.
    pub text: String,
    /// Host scope; empty matches every host.
    pub hosts: String,
    /// Port scope; empty matches every port.
    pub port: String,
    /// Severity-label scope; empty matches every severity.
    pub threat: String,
    /// Replacement severity label; required.
    pub new_threat: String,
    /// Uuid of the task scope, if any.
    pub task: Option<String>,
    /// Uuid of the result scope, if any.
    pub result: Option<String>,
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Effective severity of one result for one user: the first matching
/// override's replacement, or the raw type. Ordering prefers
/// result-scoped, then task-scoped, then port-scoped overrides, then the
/// most severe threat scope.
pub(crate) fn effective_type(
    tx: &Tx<'_>,
    user_rid: Option<i64>,
    task_rid: i64,
    result_rid: i64,
    nvt: &str,
    host: &str,
    port: &str,
    raw_type: &str,
) -> Result<String, StoreError> {
    let replacement = tx.opt_string(
        "SELECT new_threat FROM overrides
         WHERE (owner IS NULL OR owner = ?1)
           AND nvt = ?2
           AND (task = 0 OR task = ?3)
           AND (result = 0 OR result = ?4)
           AND (hosts IS NULL OR hosts = '' OR hosts_contains(hosts, ?5))
           AND (port IS NULL OR port = '' OR port = ?6)
           AND (threat IS NULL OR threat = '' OR threat = ?7)
         ORDER BY result DESC, task DESC, port DESC,
                  threat COLLATE collate_message_type ASC, rid ASC
         LIMIT 1",
        params![user_rid, nvt, task_rid, result_rid, host, port, raw_type],
    )?;
    Ok(replacement.unwrap_or_else(|| raw_type.to_string()))
}

/// Most recent completed (Done) report of a task, skipping hidden rows;
/// `offset` 0 is the latest, 1 the one before.
pub(crate) fn completed_report(
    tx: &Tx<'_>,
    task_rid: i64,
    offset: i64,
) -> Result<Option<i64>, StoreError> {
    tx.opt_i64(
        "SELECT rid FROM reports
         WHERE task = ?1 AND scan_run_status = ?2 AND hidden = 0
         ORDER BY date DESC LIMIT 1 OFFSET ?3",
        params![task_rid, RunStatus::Done.code(), offset],
    )
}

/// Maximum effective severity over one report, with per-level counts.
fn report_severity_profile(
    tx: &Tx<'_>,
    user_rid: Option<i64>,
    report_rid: i64,
    apply_overrides: bool,
) -> Result<(Option<MessageType>, [i64; 6]), StoreError> {
    let rows = tx.rows(
        "SELECT results.rid, results.task, results.nvt, results.host, results.port,
                results.type
         FROM results, report_results
         WHERE report_results.report = ?1 AND report_results.result = results.rid",
        params![report_rid],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            ))
        },
    )?;
    let mut maximum: Option<MessageType> = None;
    let mut counts = [0_i64; 6];
    for (result_rid, task_rid, nvt, host, port, raw_type) in rows {
        let label = if apply_overrides {
            effective_type(tx, user_rid, task_rid, result_rid, &nvt, &host, &port, &raw_type)?
        } else {
            raw_type
        };
        if let Some(message_type) = MessageType::parse(&label) {
            counts[usize::from(severity_slot(message_type))] += 1;
            maximum = Some(maximum.map_or(message_type, |current| current.max(message_type)));
        }
    }
    Ok((maximum, counts))
}

/// Stable count-array slot per severity, most severe first.
const fn severity_slot(message_type: MessageType) -> u8 {
    match message_type {
        MessageType::SecurityHole => 0,
        MessageType::SecurityWarning => 1,
        MessageType::SecurityNote => 2,
        MessageType::LogMessage => 3,
        MessageType::DebugMessage => 4,
        MessageType::FalsePositive => 5,
    }
}

// ============================================================================
// SECTION: Aggregation
// ============================================================================

impl Manage {
    /// Threat level of a task: maximum effective severity over its most
    /// recent completed report. `None` when no completed report exists.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn task_threat_level(
        &mut self,
        task_rid: i64,
        apply_overrides: bool,
    ) -> Result<Option<ThreatLevel>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(report_rid) = completed_report(tx, task_rid, 0)? else {
                return Ok(None);
            };
            let (maximum, _) =
                report_severity_profile(tx, user_rid, report_rid, apply_overrides)?;
            Ok::<_, StoreError>(maximum.map(ThreatLevel::from))
        })?)
    }

    /// Threat level over the second-most-recent completed report.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn task_previous_threat_level(
        &mut self,
        task_rid: i64,
        apply_overrides: bool,
    ) -> Result<Option<ThreatLevel>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(report_rid) = completed_report(tx, task_rid, 1)? else {
                return Ok(None);
            };
            let (maximum, _) =
                report_severity_profile(tx, user_rid, report_rid, apply_overrides)?;
            Ok::<_, StoreError>(maximum.map(ThreatLevel::from))
        })?)
    }

    /// Trend over the last two completed reports: `""` with fewer than two
    /// completed reports or while the task runs, `up`/`down` when the
    /// maximum level moved, else `more`/`less`/`same` comparing counts at
    /// the shared highest level.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn task_trend(
        &mut self,
        task_rid: i64,
        apply_overrides: bool,
    ) -> Result<&'static str, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let status_code =
                tx.scalar_i64("SELECT run_status FROM tasks WHERE rid = ?1", params![task_rid])?;
            if RunStatus::from_code(status_code).is_some_and(|status| {
                matches!(status, RunStatus::Running | RunStatus::Requested)
            }) {
                return Ok("");
            }
            let Some(latest) = completed_report(tx, task_rid, 0)? else {
                return Ok("");
            };
            let Some(previous) = completed_report(tx, task_rid, 1)? else {
                return Ok("");
            };
            let (latest_max, latest_counts) =
                report_severity_profile(tx, user_rid, latest, apply_overrides)?;
            let (previous_max, previous_counts) =
                report_severity_profile(tx, user_rid, previous, apply_overrides)?;
            let outcome = match (latest_max, previous_max) {
                (None, None) => "same",
                (Some(_), None) => "up",
                (None, Some(_)) => "down",
                (Some(now), Some(then)) => {
                    if now > then {
                        "up"
                    } else if now < then {
                        "down"
                    } else {
                        let slot = usize::from(severity_slot(now));
                        if latest_counts[slot] > previous_counts[slot] {
                            "more"
                        } else if latest_counts[slot] < previous_counts[slot] {
                            "less"
                        } else {
                            "same"
                        }
                    }
                }
            };
            Ok::<_, StoreError>(outcome)
        })?)
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl Manage {
    /// Creates an override owned by the session user. The replacement
    /// severity is required; scopes validate like notes.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_override(&mut self, new: &NewOverride) -> Result<CreateOutcome, EntityError> {
        if new.nvt.is_empty()
            || MessageType::parse(&new.new_threat).is_none()
            || !(new.threat.is_empty() || MessageType::parse(&new.threat).is_some())
        {
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
                "INSERT INTO overrides (uuid, owner, nvt, creation_time, modification_time,
                                        text, hosts, port, threat, new_threat, task, result)
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    uuid.as_str(),
                    user_rid,
                    new.nvt,
                    now,
                    new.text,
                    new.hosts,
                    new.port,
                    new.threat,
                    new.new_threat,
                    task_rid,
                    result_rid
                ],
            )?;
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible override by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_override_by_uuid(
        &mut self,
        uuid: &str,
    ) -> Result<Option<Override>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "overrides", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT rid, uuid, owner, nvt, creation_time, modification_time, text,
                        hosts, port, threat, new_threat, task, result
                 FROM overrides WHERE rid = ?1",
                params![rid],
                override_from_row,
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Iterates overrides visible to the session, in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_overrides(&mut self) -> Result<Vec<Override>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let sql = "SELECT rid, uuid, owner, nvt, creation_time, modification_time,
                              text, hosts, port, threat, new_threat, task, result
                       FROM overrides";
            match user_rid {
                Some(rid) => tx.rows(
                    &format!("{sql} WHERE owner IS NULL OR owner = ?1 ORDER BY creation_time"),
                    params![rid],
                    override_from_row,
                ),
                None => tx.rows(
                    &format!("{sql} WHERE owner IS NULL ORDER BY creation_time"),
                    [],
                    override_from_row,
                ),
            }
        })?)
    }

    /// Iterates overrides applying to one result, in the resolver's
    /// precedence order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn overrides_for_result(
        &mut self,
        result_rid: i64,
        task_rid: i64,
    ) -> Result<Vec<Override>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            tx.rows(
                "SELECT overrides.rid, overrides.uuid, overrides.owner, overrides.nvt,
                        overrides.creation_time, overrides.modification_time,
                        overrides.text, overrides.hosts, overrides.port,
                        overrides.threat, overrides.new_threat, overrides.task,
                        overrides.result
                 FROM overrides, results
                 WHERE results.rid = ?1
                   AND overrides.nvt = results.nvt
                   AND (overrides.owner IS NULL OR overrides.owner = ?2)
                   AND (overrides.task = 0 OR overrides.task = ?3)
                   AND (overrides.result = 0 OR overrides.result = results.rid)
                   AND (overrides.hosts IS NULL OR overrides.hosts = ''
                        OR hosts_contains(overrides.hosts, results.host))
                   AND (overrides.port IS NULL OR overrides.port = ''
                        OR overrides.port = results.port)
                   AND (overrides.threat IS NULL OR overrides.threat = ''
                        OR overrides.threat = results.type)
                 ORDER BY overrides.result DESC, overrides.task DESC,
                          overrides.port DESC,
                          overrides.threat COLLATE collate_message_type ASC,
                          overrides.rid ASC",
                params![result_rid, user_rid, task_rid],
                override_from_row,
            )
        })?)
    }

    /// Counts overrides visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_overrides(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self
            .store()
            .immediate(|tx| crate::access::visible_count(tx, "overrides", user_rid))?)
    }

    /// Modifies an override, stamping the modification time.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn modify_override(
        &mut self,
        uuid: &str,
        new: &NewOverride,
    ) -> Result<ModifyOutcome, EntityError> {
        if MessageType::parse(&new.new_threat).is_none()
            || !(new.threat.is_empty() || MessageType::parse(&new.threat).is_some())
        {
            return Ok(ModifyOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        let now = unix_now();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "overrides", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            tx.exec(
                "UPDATE overrides SET text = ?1, hosts = ?2, port = ?3, threat = ?4,
                                      new_threat = ?5, modification_time = ?6
                 WHERE rid = ?7",
                params![new.text, new.hosts, new.port, new.threat, new.new_threat, now, rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Deletes an override. Overrides are never referenced, so delete
    /// always proceeds for a visible row.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_override(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "overrides", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            tx.exec("DELETE FROM overrides WHERE rid = ?1", params![rid])?;
            Ok::<_, EntityError>(DeleteOutcome::Deleted)
        })
    }
}

/// Maps one row of the standard override projection.
fn override_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Override> {
    Ok(Override {
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
        new_threat: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
        task: row.get(11)?,
        result: row.get(12)?,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use rusqlite::params;
    use scan_manager_store::StoreError;

    use super::NewOverride;
    use super::effective_type;
    use crate::outcome::CreateOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    /// Inserts a warning result on 192.168.1.10:80 for the example task
    /// and returns (task_rid, result_rid).
    fn seed_warning_result(manage: &mut crate::context::Manage) -> (i64, i64) {
        manage
            .store()
            .exclusive(|tx| -> Result<(i64, i64), StoreError> {
                let task_rid = tx.scalar_i64("SELECT rid FROM tasks LIMIT 1", [])?;
                tx.exec(
                    "INSERT INTO results (uuid, task, subnet, host, port, nvt, type,
                                          description)
                     VALUES (make_uuid(), ?1, '', '192.168.1.10', '80/tcp', 'OID-A',
                             'Security Warning', 'weak banner')",
                    params![task_rid],
                )?;
                Ok((task_rid, tx.last_insert_rid()))
            })
            .unwrap()
    }

    #[test]
    fn matching_override_reassigns_severity() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let (task_rid, result_rid) = seed_warning_result(&mut manage);
        let spec_override = NewOverride {
            nvt: "OID-A".to_string(),
            hosts: "192.168.1.10".to_string(),
            port: "80/tcp".to_string(),
            threat: "Security Warning".to_string(),
            new_threat: "False Positive".to_string(),
            ..NewOverride::default()
        };
        assert!(matches!(
            manage.create_override(&spec_override).unwrap(),
            CreateOutcome::Created(_)
        ));
        let user_rid = manage.user_rid();
        let effective = manage
            .store()
            .immediate(|tx| {
                effective_type(
                    tx,
                    user_rid,
                    task_rid,
                    result_rid,
                    "OID-A",
                    "192.168.1.10",
                    "80/tcp",
                    "Security Warning",
                )
            })
            .unwrap();
        assert_eq!(effective, "False Positive");
    }

    #[test]
    fn scope_mismatches_leave_the_raw_type() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let (task_rid, result_rid) = seed_warning_result(&mut manage);
        let elsewhere = NewOverride {
            nvt: "OID-A".to_string(),
            hosts: "10.9.9.9".to_string(),
            new_threat: "False Positive".to_string(),
            ..NewOverride::default()
        };
        manage.create_override(&elsewhere).unwrap();
        let user_rid = manage.user_rid();
        let effective = manage
            .store()
            .immediate(|tx| {
                effective_type(
                    tx,
                    user_rid,
                    task_rid,
                    result_rid,
                    "OID-A",
                    "192.168.1.10",
                    "80/tcp",
                    "Security Warning",
                )
            })
            .unwrap();
        assert_eq!(effective, "Security Warning");
    }

    #[test]
    fn another_users_override_does_not_apply() {
        let mut manage = initialized_manage();
        login(&mut manage, "bob");
        let (task_rid, result_rid) = seed_warning_result(&mut manage);
        let bobs = NewOverride {
            nvt: "OID-A".to_string(),
            new_threat: "Log Message".to_string(),
            ..NewOverride::default()
        };
        manage.create_override(&bobs).unwrap();
        login(&mut manage, "alice");
        let user_rid = manage.user_rid();
        let effective = manage
            .store()
            .immediate(|tx| {
                effective_type(
                    tx,
                    user_rid,
                    task_rid,
                    result_rid,
                    "OID-A",
                    "192.168.1.10",
                    "80/tcp",
                    "Security Warning",
                )
            })
            .unwrap();
        assert_eq!(effective, "Security Warning");
    }

    #[test]
    fn result_scoped_override_wins_over_generic() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let (task_rid, result_rid) = seed_warning_result(&mut manage);
        let result_uuid = manage
            .store()
            .immediate(|tx| {
                tx.scalar_string("SELECT uuid FROM results WHERE rid = ?1", params![result_rid])
            })
            .unwrap();
        let generic = NewOverride {
            nvt: "OID-A".to_string(),
            new_threat: "Log Message".to_string(),
            ..NewOverride::default()
        };
        manage.create_override(&generic).unwrap();
        let scoped = NewOverride {
            nvt: "OID-A".to_string(),
            new_threat: "False Positive".to_string(),
            result: Some(result_uuid),
            ..NewOverride::default()
        };
        manage.create_override(&scoped).unwrap();
        let user_rid = manage.user_rid();
        let effective = manage
            .store()
            .immediate(|tx| {
                effective_type(
                    tx,
                    user_rid,
                    task_rid,
                    result_rid,
                    "OID-A",
                    "192.168.1.10",
                    "80/tcp",
                    "Security Warning",
                )
            })
            .unwrap();
        assert_eq!(effective, "False Positive");
    }

    #[test]
    fn invalid_replacement_severity_is_rejected() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let bad = NewOverride {
            nvt: "OID-A".to_string(),
            new_threat: "Catastrophic".to_string(),
            ..NewOverride::default()
        };
        assert_eq!(manage.create_override(&bad).unwrap(), CreateOutcome::InvalidInput);
    }
}
