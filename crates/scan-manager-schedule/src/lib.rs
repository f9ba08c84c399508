// crates/scan-manager-schedule/src/lib.rs
// ============================================================================
// Module: Schedule Evaluator
// Description: The periodic tick that starts and stops scheduled tasks.
// Purpose: Compute start-due and stop-due predicates over all (task,
//          schedule) pairs under one exclusive transaction and drive the
//          lifecycle through its transaction-level gateways.
// Dependencies: rusqlite, scan-manager-core, scan-manager-entities,
//               scan-manager-store
// ============================================================================

//! ## Overview
//! A tick iterates every task bound to a schedule inside one exclusive
//! transaction, so no other writer can move task rows mid-evaluation.
//! Stop-due tasks are stopped before any new start; start-due tasks are
//! dispatched in row order through the atomic request-to-start gateway,
//! each under its owner's credentials. The cached `schedule_next_time` is
//! refreshed for every pair. Lifecycle events are returned to the caller,
//! which hands them to the escalation engine after the commit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::RunStatus;
use scan_manager_core::ScheduleTiming;
use scan_manager_core::TaskEvent;
use scan_manager_entities::EntityError;
use scan_manager_entities::Manage;
use scan_manager_entities::StartOutcome;
use scan_manager_entities::tasks::request_task_start_in_tx;
use scan_manager_entities::tasks::set_run_status_in_tx;
use scan_manager_store::StoreError;
use scan_manager_store::Tx;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Evaluator failure.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Underlying repository failure.
    #[error(transparent)]
    Entity(#[from] EntityError),
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Tick
// ============================================================================

/// Result of one evaluator tick: events for the escalation engine, in
/// dispatch order (stops before starts).
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Stop requests issued for stop-due tasks.
    pub stopped: Vec<TaskEvent>,
    /// Start requests issued for start-due tasks.
    pub started: Vec<TaskEvent>,
}

/// One scheduled task as seen at the start of the tick.
struct ScheduledTask {
    /// Task row id.
    task_rid: i64,
    /// Task owner rid.
    owner: Option<i64>,
    /// Task status when the tick began.
    status: RunStatus,
    /// Cached next fire time the start predicate reads.
    schedule_next_time: i64,
    /// Timing columns of the bound schedule.
    timing: ScheduleTiming,
}

/// Whether the task is start-due: terminal, with a cached fire time that
/// has arrived.
const fn start_due(task: &ScheduledTask, now: i64) -> bool {
    task.status.is_terminal()
        && task.schedule_next_time > 0
        && task.schedule_next_time <= now
}

/// Whether the task is stop-due: running or requested with its window
/// exceeded.
fn stop_due(task: &ScheduledTask, now: i64) -> bool {
    matches!(task.status, RunStatus::Running | RunStatus::Requested)
        && task.timing.stop_window_exceeded(now)
}

/// Runs one evaluator tick at `now`.
///
/// # Errors
///
/// Returns [`ScheduleError`] on store failure; the whole tick rolls back.
pub fn tick(manage: &mut Manage, now: i64) -> Result<TickOutcome, ScheduleError> {
    manage.store().exclusive(|tx| {
        let tasks = scheduled_tasks(tx)?;
        let mut outcome = TickOutcome::default();
        // Stops run before any new start within the same tick.
        for task in &tasks {
            if stop_due(task, now) {
                let event =
                    set_run_status_in_tx(tx, task.task_rid, RunStatus::StopRequested, now)?;
                debug!(task = task.task_rid, "schedule window exceeded, stop requested");
                outcome.stopped.push(event);
            }
        }
        // Starts dispatch in row order, each under the owner's credentials.
        for task in &tasks {
            if start_due(task, now) {
                match request_task_start_in_tx(tx, task.task_rid, task.owner, now)? {
                    StartOutcome::Requested {
                        event, ..
                    } => {
                        debug!(task = task.task_rid, "schedule fired, start requested");
                        outcome.started.push(event);
                    }
                    StartOutcome::AlreadyActive {
                        ..
                    }
                    | StartOutcome::Missing => {}
                }
                refresh_next_time(tx, task, now + 1)?;
            } else {
                refresh_next_time(tx, task, now)?;
            }
        }
        Ok::<_, ScheduleError>(outcome)
    })
}

/// Loads every (task, schedule) pair.
fn scheduled_tasks(tx: &Tx<'_>) -> Result<Vec<ScheduledTask>, StoreError> {
    tx.rows(
        "SELECT tasks.rid, tasks.owner, tasks.run_status, tasks.schedule_next_time,
                schedules.first_time, schedules.period, schedules.period_months,
                schedules.duration
         FROM tasks JOIN schedules ON schedules.rid = tasks.schedule
         WHERE tasks.schedule != 0 AND tasks.hidden = 0
         ORDER BY tasks.rid",
        [],
        |row| {
            Ok(ScheduledTask {
                task_rid: row.get(0)?,
                owner: row.get(1)?,
                status: RunStatus::from_code(row.get(2)?).unwrap_or(RunStatus::InternalError),
                schedule_next_time: row.get(3)?,
                timing: ScheduleTiming {
                    first_time: row.get(4)?,
                    period: row.get(5)?,
                    period_months: row.get(6)?,
                    duration: row.get(7)?,
                },
            })
        },
    )
}

/// Writes the freshly computed next fire time for one pair.
fn refresh_next_time(
    tx: &Tx<'_>,
    task: &ScheduledTask,
    from: i64,
) -> Result<(), StoreError> {
    let next = task.timing.next_fire(from);
    if next != task.schedule_next_time {
        tx.exec(
            "UPDATE tasks SET schedule_next_time = ?1 WHERE rid = ?2",
            params![next, task.task_rid],
        )?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use rusqlite::params;
    use scan_manager_core::RunStatus;
    use scan_manager_core::ScheduleTiming;
    use scan_manager_entities::CreateOutcome;
    use scan_manager_entities::Manage;
    use scan_manager_store::Store;
    use scan_manager_store::initialize;

    use super::tick;

    /// 2024-06-01T09:00:00Z.
    const NINE_AM: i64 = 1_717_232_400;

    fn manage_with_user() -> Manage {
        let mut store = Store::open_in_memory().unwrap();
        initialize(&mut store).unwrap();
        let mut manage = Manage::new(store);
        let user = manage.ensure_user("alice").unwrap();
        manage.set_user(Some(user));
        manage
    }

    /// Creates a schedule and a task bound to it; returns the task rid.
    fn scheduled_task(manage: &mut Manage, timing: ScheduleTiming) -> i64 {
        let CreateOutcome::Created(schedule_uuid) = manage
            .create_schedule(&scan_manager_entities::schedules::NewSchedule {
                name: "tick schedule".to_string(),
                comment: String::new(),
                timing,
            })
            .unwrap()
        else {
            panic!("expected schedule create");
        };
        let CreateOutcome::Created(task_uuid) = manage
            .create_task(&scan_manager_entities::tasks::NewTask {
                name: "scheduled".to_string(),
                config: "daba56c8-73ec-11df-a475-002264764cea".to_string(),
                target: "b493b7a8-7489-11df-a3ec-002264764cea".to_string(),
                schedule: Some(schedule_uuid.as_str().to_string()),
                ..scan_manager_entities::tasks::NewTask::default()
            })
            .unwrap()
        else {
            panic!("expected task create");
        };
        manage.find_task_by_uuid(task_uuid.as_str()).unwrap().unwrap().rid
    }

    fn task_state(manage: &mut Manage, task_rid: i64) -> (i64, i64) {
        manage
            .store()
            .immediate(|tx| {
                Ok::<_, scan_manager_store::StoreError>((
                    tx.scalar_i64(
                        "SELECT run_status FROM tasks WHERE rid = ?1",
                        params![task_rid],
                    )?,
                    tx.scalar_i64(
                        "SELECT schedule_next_time FROM tasks WHERE rid = ?1",
                        params![task_rid],
                    )?,
                ))
            })
            .unwrap()
    }

    #[test]
    fn one_shot_schedule_fires_once_then_exhausts() {
        let mut manage = manage_with_user();
        let task_rid = scheduled_task(
            &mut manage,
            ScheduleTiming {
                first_time: NINE_AM,
                period: 0,
                period_months: 0,
                duration: 0,
            },
        );
        // One second early: nothing fires, the cache holds the fire time.
        let early = tick(&mut manage, NINE_AM - 1).unwrap();
        assert!(early.started.is_empty());
        assert_eq!(task_state(&mut manage, task_rid), (RunStatus::New.code(), NINE_AM));
        // On time: the start fires and the schedule exhausts.
        let fired = tick(&mut manage, NINE_AM).unwrap();
        assert_eq!(fired.started.len(), 1);
        assert_eq!(
            task_state(&mut manage, task_rid),
            (RunStatus::Requested.code(), 0)
        );
        // A second later nothing further is due.
        let after = tick(&mut manage, NINE_AM + 1).unwrap();
        assert!(after.started.is_empty());
    }

    #[test]
    fn window_exceeded_stops_before_new_starts() {
        let mut manage = manage_with_user();
        let task_rid = scheduled_task(
            &mut manage,
            ScheduleTiming {
                first_time: NINE_AM,
                period: 3_600,
                period_months: 0,
                duration: 600,
            },
        );
        tick(&mut manage, NINE_AM).unwrap();
        manage.set_task_run_status(task_rid, RunStatus::Running).unwrap();
        // Within the window nothing stops.
        assert!(tick(&mut manage, NINE_AM + 600).unwrap().stopped.is_empty());
        // Past the window the task is stop-due.
        let outcome = tick(&mut manage, NINE_AM + 601).unwrap();
        assert_eq!(outcome.stopped.len(), 1);
        assert_eq!(
            task_state(&mut manage, task_rid).0,
            RunStatus::StopRequested.code()
        );
    }

    #[test]
    fn active_tasks_are_not_restarted() {
        let mut manage = manage_with_user();
        let task_rid = scheduled_task(
            &mut manage,
            ScheduleTiming {
                first_time: NINE_AM,
                period: 60,
                period_months: 0,
                duration: 0,
            },
        );
        tick(&mut manage, NINE_AM).unwrap();
        // The next period arrives while the task is still requested.
        let outcome = tick(&mut manage, NINE_AM + 60).unwrap();
        assert!(outcome.started.is_empty());
        assert_eq!(task_state(&mut manage, task_rid).0, RunStatus::Requested.code());
    }
}
