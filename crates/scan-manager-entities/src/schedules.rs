// crates/scan-manager-entities/src/schedules.rs
// ============================================================================
// Module: Schedule Repository
// Description: Accessors for time-based schedules.
// Purpose: Validate periodicity, keep bound tasks' cached fire times
//          fresh, and guard deletes behind task references.
// Dependencies: crate::{access, context, outcome}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! A schedule is `(first_time, period, period_months, duration)`. At most
//! one of the two periods may be nonzero; `duration == 0` disables the
//! stop window. Tasks cache the next fire time in `schedule_next_time`;
//! creating a binding or modifying a schedule refreshes the cache so the
//! evaluator tick reads current values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::EntityUuid;
use scan_manager_core::ScheduleTiming;

use crate::access::name_taken;
use crate::access::visible_count;
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

/// One schedule row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for global schedules.
    pub owner: Option<i64>,
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Timing columns.
    pub timing: ScheduleTiming,
}

/// Fields for a schedule create or modify.
#[derive(Debug, Clone, Default)]
pub struct NewSchedule {
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Timing columns.
    pub timing: ScheduleTiming,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Maps one row of the standard schedule projection.
fn schedule_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        rid: row.get(0)?,
        uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
        owner: row.get(2)?,
        name: row.get(3)?,
        comment: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        timing: ScheduleTiming {
            first_time: row.get(5)?,
            period: row.get(6)?,
            period_months: row.get(7)?,
            duration: row.get(8)?,
        },
    })
}

/// Whether the timing columns are acceptable: a positive first time and at
/// most one nonzero period.
const fn timing_valid(timing: &ScheduleTiming) -> bool {
    timing.first_time > 0
        && timing.period >= 0
        && timing.period_months >= 0
        && timing.duration >= 0
        && !(timing.period > 0 && timing.period_months > 0)
}

impl Manage {
    /// Creates a schedule owned by the session user.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_schedule(&mut self, new: &NewSchedule) -> Result<CreateOutcome, EntityError> {
        if !timing_valid(&new.timing) {
            return Ok(CreateOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        let uuid = EntityUuid::generate();
        self.store().exclusive(|tx| {
            if name_taken(tx, "schedules", &new.name, user_rid)? {
                return Ok(CreateOutcome::Exists);
            }
            tx.exec(
                "INSERT INTO schedules (uuid, owner, name, comment, first_time, period,
                                        period_months, duration)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    uuid.as_str(),
                    user_rid,
                    new.name,
                    new.comment,
                    new.timing.first_time,
                    new.timing.period,
                    new.timing.period_months,
                    new.timing.duration
                ],
            )?;
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible schedule by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_schedule_by_uuid(
        &mut self,
        uuid: &str,
    ) -> Result<Option<Schedule>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "schedules", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT rid, uuid, owner, name, comment, first_time, period,
                        period_months, duration
                 FROM schedules WHERE rid = ?1",
                params![rid],
                schedule_from_row,
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Iterates schedules visible to the session, in rid order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_schedules(&mut self) -> Result<Vec<Schedule>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let sql = "SELECT rid, uuid, owner, name, comment, first_time, period,
                              period_months, duration
                       FROM schedules";
            match user_rid {
                Some(rid) => tx.rows(
                    &format!("{sql} WHERE owner IS NULL OR owner = ?1 ORDER BY rid"),
                    params![rid],
                    schedule_from_row,
                ),
                None => tx.rows(
                    &format!("{sql} WHERE owner IS NULL ORDER BY rid"),
                    [],
                    schedule_from_row,
                ),
            }
        })?)
    }

    /// Counts schedules visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_schedules(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| visible_count(tx, "schedules", user_rid))?)
    }

    /// Modifies a schedule and refreshes the cached fire time of every
    /// bound task.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn modify_schedule(
        &mut self,
        uuid: &str,
        new: &NewSchedule,
    ) -> Result<ModifyOutcome, EntityError> {
        if !timing_valid(&new.timing) {
            return Ok(ModifyOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        let now = unix_now();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "schedules", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            let current_name =
                tx.scalar_string("SELECT name FROM schedules WHERE rid = ?1", params![rid])?;
            if current_name != new.name && name_taken(tx, "schedules", &new.name, user_rid)? {
                return Ok(ModifyOutcome::Exists);
            }
            tx.exec(
                "UPDATE schedules SET name = ?1, comment = ?2, first_time = ?3, period = ?4,
                                      period_months = ?5, duration = ?6
                 WHERE rid = ?7",
                params![
                    new.name,
                    new.comment,
                    new.timing.first_time,
                    new.timing.period,
                    new.timing.period_months,
                    new.timing.duration,
                    rid
                ],
            )?;
            tx.exec(
                "UPDATE tasks SET schedule_next_time = ?1 WHERE schedule = ?2",
                params![new.timing.next_fire(now), rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Whether any task is bound to the schedule. `None` when the uuid is
    /// not visible.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn schedule_in_use(&mut self, uuid: &str) -> Result<Option<bool>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "schedules", uuid, user_rid)? else {
                return Ok(None);
            };
            let used =
                tx.opt_i64("SELECT 1 FROM tasks WHERE schedule = ?1 LIMIT 1", params![rid])?;
            Ok::<_, scan_manager_store::StoreError>(Some(used.is_some()))
        })?)
    }

    /// Deletes a schedule unless a task is bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_schedule(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "schedules", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            let used =
                tx.opt_i64("SELECT 1 FROM tasks WHERE schedule = ?1 LIMIT 1", params![rid])?;
            if used.is_some() {
                return Ok(DeleteOutcome::InUse);
            }
            tx.exec("DELETE FROM schedules WHERE rid = ?1", params![rid])?;
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

    use scan_manager_core::ScheduleTiming;

    use super::NewSchedule;
    use crate::outcome::CreateOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    fn nightly() -> NewSchedule {
        NewSchedule {
            name: "Nightly".to_string(),
            comment: String::new(),
            timing: ScheduleTiming {
                first_time: 1_717_232_400,
                period: 86_400,
                period_months: 0,
                duration: 0,
            },
        }
    }

    #[test]
    fn schedules_round_trip() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let CreateOutcome::Created(uuid) = manage.create_schedule(&nightly()).unwrap() else {
            panic!("expected create");
        };
        let schedule = manage.find_schedule_by_uuid(uuid.as_str()).unwrap().unwrap();
        assert_eq!(schedule.name, "Nightly");
        assert_eq!(schedule.timing.period, 86_400);
    }

    #[test]
    fn both_periods_nonzero_is_invalid() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let mut bad = nightly();
        bad.timing.period_months = 1;
        assert_eq!(manage.create_schedule(&bad).unwrap(), CreateOutcome::InvalidInput);
    }

    #[test]
    fn zero_first_time_is_invalid() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let mut bad = nightly();
        bad.timing.first_time = 0;
        assert_eq!(manage.create_schedule(&bad).unwrap(), CreateOutcome::InvalidInput);
    }
}
