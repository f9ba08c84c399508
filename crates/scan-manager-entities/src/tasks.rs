// crates/scan-manager-entities/src/tasks.rs
// ============================================================================
// Module: Task Repository and Lifecycle
// Description: Task rows plus the authoritative run-status state machine.
// Purpose: Provide the atomic request-to-start gateway, the single
//          run-status writer, per-run report containers, and deferred
//          deletion of active tasks.
// Dependencies: crate::{access, context, outcome, schedules}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! `set_task_run_status` is the only writer of `tasks.run_status`; every
//! transition also updates the running report's `scan_run_status` and
//! returns a [`TaskEvent`] the caller hands to the escalation engine after
//! the commit. `set_task_requested` is the one safe gateway for starting a
//! scan: it decides eligibility and writes `Requested` inside a single
//! exclusive transaction, so two racing callers cannot both observe a
//! startable task. Deleting an active task defers through
//! `DeleteRequested`; deleting a terminal task removes the row and its
//! reports in one transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::EntityUuid;
use scan_manager_core::RunStatus;
use scan_manager_core::ScheduleTiming;
use scan_manager_core::TaskEvent;
use scan_manager_store::StoreError;
use scan_manager_store::Tx;

use crate::access::name_taken;
use crate::access::unique_name;
use crate::access::visible_rid_by_uuid;
use crate::context::EntityError;
use crate::context::Manage;
use crate::context::unix_now;
use crate::outcome::CreateOutcome;
use crate::outcome::ModifyOutcome;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One task row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for the predefined example task.
    pub owner: Option<i64>,
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Scan description forwarded to the scanner.
    pub description: String,
    /// Lifecycle state.
    pub run_status: RunStatus,
    /// Last scan start, unix seconds.
    pub start_time: i64,
    /// Last scan end, unix seconds.
    pub end_time: i64,
    /// Config rid; 0 only for the example task.
    pub config: i64,
    /// Target rid; 0 only for the example task.
    pub target: i64,
    /// Schedule rid; 0 when unscheduled.
    pub schedule: i64,
    /// Cached next fire time; 0 when unscheduled or exhausted.
    pub schedule_next_time: i64,
    /// Slave rid; 0 when the scan runs locally.
    pub slave: i64,
}

/// Fields for a task create.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Scan description forwarded to the scanner.
    pub description: String,
    /// Uuid of the config to run.
    pub config: String,
    /// Uuid of the target to scan.
    pub target: String,
    /// Uuid of the schedule, if any.
    pub schedule: Option<String>,
    /// Uuid of the slave to delegate to, if any.
    pub slave: Option<String>,
}

/// Outcome of the atomic request-to-start gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The task was eligible; it is now `Requested`. Carries the prior
    /// status and the event to hand to escalation.
    Requested {
        /// Status the task held before the write.
        prior: RunStatus,
        /// Event for the escalation engine.
        event: TaskEvent,
    },
    /// The task was already active; nothing changed.
    AlreadyActive {
        /// Status that blocked the start.
        prior: RunStatus,
    },
    /// No visible task with the given uuid.
    Missing,
}

/// Outcome of a task delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDeleteOutcome {
    /// The task was terminal; its row, reports, and bindings are gone.
    Removed,
    /// The task was active; removal deferred via `DeleteRequested`.
    /// Carries the event to hand to escalation.
    Deferred(TaskEvent),
    /// No visible task with the given uuid.
    Missing,
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Standard projection shared by the read paths.
const TASK_COLUMNS: &str = "rid, uuid, owner, name, comment, description, run_status, \
                            start_time, end_time, config, target, schedule, \
                            schedule_next_time, slave";

/// Maps one row of the standard task projection.
fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        rid: row.get(0)?,
        uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
        owner: row.get(2)?,
        name: row.get(3)?,
        comment: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        description: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        run_status: RunStatus::from_code(row.get(6)?).unwrap_or(RunStatus::InternalError),
        start_time: row.get::<_, Option<i64>>(7)?.unwrap_or_default(),
        end_time: row.get::<_, Option<i64>>(8)?.unwrap_or_default(),
        config: row.get(9)?,
        target: row.get(10)?,
        schedule: row.get(11)?,
        schedule_next_time: row.get(12)?,
        slave: row.get(13)?,
    })
}

/// The transaction-level request-to-start gateway: reads the current
/// status, refuses active tasks, otherwise creates the per-run report
/// container (owned by `owner_rid`) and writes `Requested`. The schedule
/// evaluator calls this for each start-due task under its single
/// exclusive tick transaction, acting as the task owner.
///
/// # Errors
///
/// Returns [`StoreError`] on engine failure.
pub fn request_task_start_in_tx(
    tx: &Tx<'_>,
    task_rid: i64,
    owner_rid: Option<i64>,
    now: i64,
) -> Result<StartOutcome, StoreError> {
    let prior_code =
        tx.scalar_i64("SELECT run_status FROM tasks WHERE rid = ?1", params![task_rid])?;
    let prior = RunStatus::from_code(prior_code).unwrap_or(RunStatus::InternalError);
    if prior.is_active() {
        return Ok(StartOutcome::AlreadyActive {
            prior,
        });
    }
    tx.exec(
        "INSERT INTO reports (uuid, owner, hidden, task, date, comment, scan_run_status)
         VALUES (make_uuid(), ?1, 0, ?2, ?3, '', ?4)",
        params![owner_rid, task_rid, now, RunStatus::Requested.code()],
    )?;
    let event = set_run_status_in_tx(tx, task_rid, RunStatus::Requested, now)?;
    Ok(StartOutcome::Requested {
        prior,
        event,
    })
}

/// Builds the event value for a transition, inside the same transaction.
fn event_for(tx: &Tx<'_>, task_rid: i64, status: RunStatus) -> Result<TaskEvent, StoreError> {
    let rows = tx.rows(
        "SELECT uuid, name FROM tasks WHERE rid = ?1",
        params![task_rid],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )?;
    let (uuid, name) = rows.into_iter().next().unwrap_or_default();
    Ok(TaskEvent {
        task_rid,
        task_uuid: EntityUuid::from_stored(uuid),
        task_name: name,
        status,
    })
}

/// Writes the new status on the task and its running report, stamping
/// start/end times on the boundary transitions. Exposed at transaction
/// level so the schedule evaluator can drive many transitions under its
/// single exclusive tick transaction; everything else goes through
/// [`Manage::set_task_run_status`].
pub fn set_run_status_in_tx(
    tx: &Tx<'_>,
    task_rid: i64,
    status: RunStatus,
    now: i64,
) -> Result<TaskEvent, StoreError> {
    tx.exec(
        "UPDATE tasks SET run_status = ?1 WHERE rid = ?2",
        params![status.code(), task_rid],
    )?;
    match status {
        RunStatus::Running => {
            tx.exec(
                "UPDATE tasks SET start_time = ?1 WHERE rid = ?2",
                params![now, task_rid],
            )?;
            tx.exec(
                "UPDATE reports SET start_time = ?1
                 WHERE task = ?2 AND scan_run_status = ?3 AND start_time IS NULL",
                params![now, task_rid, RunStatus::Requested.code()],
            )?;
        }
        RunStatus::Done | RunStatus::Stopped | RunStatus::InternalError => {
            tx.exec(
                "UPDATE tasks SET end_time = ?1 WHERE rid = ?2",
                params![now, task_rid],
            )?;
            tx.exec(
                "UPDATE reports SET end_time = ?1
                 WHERE task = ?2 AND scan_run_status NOT IN (?3, ?4, ?5)",
                params![
                    now,
                    task_rid,
                    RunStatus::Done.code(),
                    RunStatus::Stopped.code(),
                    RunStatus::InternalError.code()
                ],
            )?;
        }
        _ => {}
    }
    // The running report mirrors every transition until it reaches a
    // terminal state of its own.
    tx.exec(
        "UPDATE reports SET scan_run_status = ?1
         WHERE task = ?2 AND scan_run_status NOT IN (?3, ?4, ?5)",
        params![
            status.code(),
            task_rid,
            RunStatus::Done.code(),
            RunStatus::Stopped.code(),
            RunStatus::InternalError.code()
        ],
    )?;
    event_for(tx, task_rid, status)
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl Manage {
    /// Creates a task owned by the session user, `New` and unscheduled
    /// until references say otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_task(&mut self, new: &NewTask) -> Result<CreateOutcome, EntityError> {
        let user_rid = self.user_rid();
        let uuid = EntityUuid::generate();
        let now = unix_now();
        self.store().exclusive(|tx| {
            if name_taken(tx, "tasks", &new.name, user_rid)? {
                return Ok(CreateOutcome::Exists);
            }
            let Some(config_rid) = visible_rid_by_uuid(tx, "configs", &new.config, user_rid)?
            else {
                return Ok(CreateOutcome::MissingReference);
            };
            let Some(target_rid) = visible_rid_by_uuid(tx, "targets", &new.target, user_rid)?
            else {
                return Ok(CreateOutcome::MissingReference);
            };
            let mut schedule_rid = 0;
            let mut schedule_next_time = 0;
            if let Some(schedule_uuid) = &new.schedule {
                let Some(rid) = visible_rid_by_uuid(tx, "schedules", schedule_uuid, user_rid)?
                else {
                    return Ok(CreateOutcome::MissingReference);
                };
                schedule_rid = rid;
                let timing = schedule_timing(tx, rid)?;
                schedule_next_time = timing.next_fire(now);
            }
            let mut slave_rid = 0;
            if let Some(slave_uuid) = &new.slave {
                match visible_rid_by_uuid(tx, "slaves", slave_uuid, user_rid)? {
                    Some(rid) => slave_rid = rid,
                    None => return Ok(CreateOutcome::MissingReference),
                }
            }
            tx.exec(
                "INSERT INTO tasks (uuid, owner, name, hidden, comment, description,
                                    run_status, config, target, schedule,
                                    schedule_next_time, slave)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    uuid.as_str(),
                    user_rid,
                    new.name,
                    new.comment,
                    new.description,
                    RunStatus::New.code(),
                    config_rid,
                    target_rid,
                    schedule_rid,
                    schedule_next_time,
                    slave_rid
                ],
            )?;
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible, non-hidden task by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_task_by_uuid(&mut self, uuid: &str) -> Result<Option<Task>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "tasks", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE rid = ?1 AND hidden = 0"),
                params![rid],
                task_from_row,
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Iterates visible, non-hidden tasks in rid order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_tasks(&mut self) -> Result<Vec<Task>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| match user_rid {
            Some(rid) => tx.rows(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks
                     WHERE hidden = 0 AND (owner IS NULL OR owner = ?1) ORDER BY rid"
                ),
                params![rid],
                task_from_row,
            ),
            None => tx.rows(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks
                     WHERE hidden = 0 AND owner IS NULL ORDER BY rid"
                ),
                [],
                task_from_row,
            ),
        })?)
    }

    /// Counts visible, non-hidden tasks.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_tasks(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| match user_rid {
            Some(rid) => tx.scalar_i64(
                "SELECT count(*) FROM tasks
                 WHERE hidden = 0 AND (owner IS NULL OR owner = ?1)",
                params![rid],
            ),
            None => {
                tx.scalar_i64("SELECT count(*) FROM tasks WHERE hidden = 0 AND owner IS NULL", [])
            }
        })?)
    }

    /// Renames a task. A duplicate requested name gets uniquified with the
    /// smallest free suffix instead of failing, matching import flows.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn modify_task(
        &mut self,
        uuid: &str,
        name: &str,
        comment: &str,
    ) -> Result<ModifyOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "tasks", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            let current_name =
                tx.scalar_string("SELECT name FROM tasks WHERE rid = ?1", params![rid])?;
            let final_name = if current_name != name && name_taken(tx, "tasks", name, user_rid)?
            {
                unique_name(tx, "tasks", name, user_rid)?
            } else {
                name.to_string()
            };
            tx.exec(
                "UPDATE tasks SET name = ?1, comment = ?2 WHERE rid = ?3",
                params![final_name, comment, rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// The atomic request-to-start gateway. Decides eligibility and writes
    /// `Requested` in one exclusive transaction; an eligible task also
    /// gets its per-run report container here.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn set_task_requested(&mut self, uuid: &str) -> Result<StartOutcome, EntityError> {
        let user_rid = self.user_rid();
        let now = unix_now();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "tasks", uuid, user_rid)? else {
                return Ok(StartOutcome::Missing);
            };
            Ok::<_, EntityError>(request_task_start_in_tx(tx, rid, user_rid, now)?)
        })
    }

    /// Writes a new run status. This is the single transition path for
    /// every scanner acknowledgement and client request besides the
    /// request-to-start gateway.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn set_task_run_status(
        &mut self,
        task_rid: i64,
        status: RunStatus,
    ) -> Result<TaskEvent, EntityError> {
        let now = unix_now();
        self.store()
            .exclusive(|tx| Ok::<_, EntityError>(set_run_status_in_tx(tx, task_rid, status, now)?))
    }

    /// Forces the currently running task to `InternalError`. Reserved for
    /// the catastrophic exit path; the caller closes the store right
    /// after.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn force_internal_error(&mut self, task_rid: i64) -> Result<TaskEvent, EntityError> {
        self.set_task_run_status(task_rid, RunStatus::InternalError)
    }

    /// Deletes a task. Active tasks defer through `DeleteRequested`;
    /// terminal tasks lose their row, reports, results, and escalator
    /// bindings in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_task(&mut self, uuid: &str) -> Result<TaskDeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        let now = unix_now();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "tasks", uuid, user_rid)? else {
                return Ok(TaskDeleteOutcome::Missing);
            };
            let status_code =
                tx.scalar_i64("SELECT run_status FROM tasks WHERE rid = ?1", params![rid])?;
            let status = RunStatus::from_code(status_code).unwrap_or(RunStatus::InternalError);
            if status.is_active() && status != RunStatus::DeleteRequested {
                let event = set_run_status_in_tx(tx, rid, RunStatus::DeleteRequested, now)?;
                return Ok(TaskDeleteOutcome::Deferred(event));
            }
            remove_task_rows(tx, rid)?;
            Ok::<_, EntityError>(TaskDeleteOutcome::Removed)
        })
    }

    /// Completes a deferred delete after the scanner acknowledged the
    /// stop: removes the task and its dependents.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn finish_deferred_delete(&mut self, task_rid: i64) -> Result<(), EntityError> {
        self.store().exclusive(|tx| {
            remove_task_rows(tx, task_rid)?;
            Ok::<_, EntityError>(())
        })
    }
}

/// Removes a task row with its reports, results, links, and bindings.
fn remove_task_rows(tx: &Tx<'_>, task_rid: i64) -> Result<(), StoreError> {
    tx.exec(
        "DELETE FROM report_results
         WHERE report IN (SELECT rid FROM reports WHERE task = ?1)",
        params![task_rid],
    )?;
    tx.exec(
        "DELETE FROM report_hosts
         WHERE report IN (SELECT rid FROM reports WHERE task = ?1)",
        params![task_rid],
    )?;
    tx.exec("DELETE FROM results WHERE task = ?1", params![task_rid])?;
    tx.exec("DELETE FROM reports WHERE task = ?1", params![task_rid])?;
    tx.exec("DELETE FROM task_escalators WHERE task = ?1", params![task_rid])?;
    tx.exec("DELETE FROM tasks WHERE rid = ?1", params![task_rid])?;
    Ok(())
}

/// Reads a schedule's timing columns.
pub(crate) fn schedule_timing(
    tx: &Tx<'_>,
    schedule_rid: i64,
) -> Result<ScheduleTiming, StoreError> {
    let rows = tx.rows(
        "SELECT first_time, period, period_months, duration FROM schedules WHERE rid = ?1",
        params![schedule_rid],
        |row| {
            Ok(ScheduleTiming {
                first_time: row.get(0)?,
                period: row.get(1)?,
                period_months: row.get(2)?,
                duration: row.get(3)?,
            })
        },
    )?;
    Ok(rows.into_iter().next().unwrap_or_default())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use rusqlite::params;
    use scan_manager_core::RunStatus;

    use super::NewTask;
    use super::StartOutcome;
    use super::TaskDeleteOutcome;
    use crate::outcome::CreateOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    /// Creates a task against the Localhost target and a clone of the
    /// "Full and fast" config; returns its uuid.
    fn sample_task(manage: &mut crate::context::Manage, name: &str) -> String {
        let CreateOutcome::Created(uuid) = manage
            .create_task(&NewTask {
                name: name.to_string(),
                config: "daba56c8-73ec-11df-a475-002264764cea".to_string(),
                target: "b493b7a8-7489-11df-a3ec-002264764cea".to_string(),
                ..NewTask::default()
            })
            .unwrap()
        else {
            panic!("expected task create");
        };
        uuid.as_str().to_string()
    }

    #[test]
    fn request_to_start_is_exclusive() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let uuid = sample_task(&mut manage, "exclusive start");
        // First caller wins and sees the prior terminal state.
        let first = manage.set_task_requested(&uuid).unwrap();
        let StartOutcome::Requested { prior, .. } = first else {
            panic!("expected requested");
        };
        assert_eq!(prior, RunStatus::New);
        // Second caller finds the task already active and changes nothing.
        let second = manage.set_task_requested(&uuid).unwrap();
        assert_eq!(
            second,
            StartOutcome::AlreadyActive {
                prior: RunStatus::Requested,
            }
        );
        let task = manage.find_task_by_uuid(&uuid).unwrap().unwrap();
        assert_eq!(task.run_status, RunStatus::Requested);
    }

    #[test]
    fn request_creates_the_report_container() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let uuid = sample_task(&mut manage, "container");
        manage.set_task_requested(&uuid).unwrap();
        let (reports, status) = manage
            .store()
            .immediate(|tx| {
                let task_rid =
                    tx.scalar_i64("SELECT rid FROM tasks WHERE uuid = ?1", params![uuid])?;
                Ok::<_, scan_manager_store::StoreError>((
                    tx.scalar_i64("SELECT count(*) FROM reports WHERE task = ?1", params![task_rid])?,
                    tx.scalar_i64(
                        "SELECT scan_run_status FROM reports WHERE task = ?1",
                        params![task_rid],
                    )?,
                ))
            })
            .unwrap();
        assert_eq!(reports, 1);
        assert_eq!(status, RunStatus::Requested.code());
    }

    #[test]
    fn transitions_mirror_into_the_running_report() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let uuid = sample_task(&mut manage, "mirror");
        manage.set_task_requested(&uuid).unwrap();
        let task_rid = manage.find_task_by_uuid(&uuid).unwrap().unwrap().rid;
        let event = manage.set_task_run_status(task_rid, RunStatus::Running).unwrap();
        assert_eq!(event.status, RunStatus::Running);
        assert_eq!(event.description(), "Task status changed to 'Running'");
        manage.set_task_run_status(task_rid, RunStatus::Done).unwrap();
        let report_status = manage
            .store()
            .immediate(|tx| {
                tx.scalar_i64(
                    "SELECT scan_run_status FROM reports WHERE task = ?1",
                    params![task_rid],
                )
            })
            .unwrap();
        assert_eq!(report_status, RunStatus::Done.code());
        let task = manage.find_task_by_uuid(&uuid).unwrap().unwrap();
        assert_eq!(task.run_status, RunStatus::Done);
        assert!(task.end_time > 0);
    }

    #[test]
    fn deleting_an_active_task_defers() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let uuid = sample_task(&mut manage, "deferred delete");
        manage.set_task_requested(&uuid).unwrap();
        let outcome = manage.delete_task(&uuid).unwrap();
        assert!(matches!(outcome, TaskDeleteOutcome::Deferred(_)));
        let task = manage.find_task_by_uuid(&uuid).unwrap().unwrap();
        assert_eq!(task.run_status, RunStatus::DeleteRequested);
        // The row survives until the scanner acknowledges the stop.
        manage.finish_deferred_delete(task.rid).unwrap();
        assert!(manage.find_task_by_uuid(&uuid).unwrap().is_none());
    }

    #[test]
    fn deleting_a_terminal_task_removes_reports_and_results() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let uuid = sample_task(&mut manage, "clean delete");
        manage.set_task_requested(&uuid).unwrap();
        let task_rid = manage.find_task_by_uuid(&uuid).unwrap().unwrap().rid;
        manage.set_task_run_status(task_rid, RunStatus::Done).unwrap();
        assert_eq!(manage.delete_task(&uuid).unwrap(), TaskDeleteOutcome::Removed);
        let leftovers = manage
            .store()
            .immediate(|tx| {
                tx.scalar_i64("SELECT count(*) FROM reports WHERE task = ?1", params![task_rid])
            })
            .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn other_users_tasks_are_invisible() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let uuid = sample_task(&mut manage, "private");
        login(&mut manage, "bob");
        assert!(manage.find_task_by_uuid(&uuid).unwrap().is_none());
        assert_eq!(manage.set_task_requested(&uuid).unwrap(), StartOutcome::Missing);
    }

    #[test]
    fn missing_references_block_creation() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let outcome = manage
            .create_task(&NewTask {
                name: "broken".to_string(),
                config: "99999999-9999-4999-8999-999999999999".to_string(),
                target: "b493b7a8-7489-11df-a3ec-002264764cea".to_string(),
                ..NewTask::default()
            })
            .unwrap();
        assert_eq!(outcome, CreateOutcome::MissingReference);
    }
}
