// crates/scan-manager-store/src/migrate.rs
// ============================================================================
// Module: Schema Migrator
// Description: Ordered chain of version-bumping schema migrations.
// Purpose: Advance a pre-existing store to the supported schema version,
//          one atomic, idempotent step at a time, with on-disk backup.
// Dependencies: crate::{schema, store}, rusqlite
// ============================================================================

//! ## Overview
//! The store records a single integer `database_version` in the `meta`
//! table. Each migration step is a pair `(target_version, fn)`; the
//! function opens an exclusive transaction, verifies the current version is
//! `target_version - 1`, applies its changes, writes the new version, and
//! commits. A failed step rolls back and leaves the store at its previous
//! consistent version. A `None` entry marks an irreversible boundary;
//! migrating across one fails without touching the store. Migration is
//! never implicit: startup refuses service on an old version until the
//! explicit `migrate` command has run.
//!
//! The version-0 schema the chain starts from:
//!
//! - `meta (rid, name UNIQUE, value)`
//! - `users (rid, uuid, name, password)`
//! - `tasks (rid, uuid, owner TEXT, name, hidden, comment, run_status,
//!   config, target)`
//! - `configs (rid, uuid, owner, name, nvt_selector, comment)`
//! - `config_preferences (rid, config, type, name, value)`
//! - `nvt_selectors (rid, name, exclude, type, family_or_nvt, family)`
//! - `nvts (rid, oid, version, name, summary, description, copyright, cve,
//!   bid, xref, tag, category, family)`
//! - `targets (rid, uuid, owner, name, hosts, comment)`
//! - `reports (rid, uuid, owner, task, date, start_time, end_time,
//!   comment)`
//! - `report_hosts (rid, report, host, start_time, end_time)`
//! - `results (rid, task, subnet, host, port, nvt, type, description)`
//! - `report_results (rid, report, result)`

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;

use rusqlite::params;
use thiserror::Error;
use tracing::info;

use crate::schema::CONFIG_UUID_FULL_AND_FAST;
use crate::schema::CONFIG_UUID_FULL_AND_FAST_ULTIMATE;
use crate::schema::CONFIG_UUID_FULL_AND_VERY_DEEP;
use crate::schema::CONFIG_UUID_FULL_AND_VERY_DEEP_ULTIMATE;
use crate::schema::REPORT_UUID_EXAMPLE;
use crate::schema::seed_report_formats;
use crate::store::Store;
use crate::store::StoreError;
use crate::store::Tx;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// The schema version this build reads and writes.
pub const SUPPORTED_VERSION: i64 = 36;

/// Steps that move row data and therefore warrant a `VACUUM` afterwards.
const DATA_MOVING_STEPS: [i64; 3] = [9, 24, 31];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Migration failure.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The store has no recorded version; it was never initialized.
    #[error("store has no recorded version; run init first")]
    NotInitialized,
    /// The store was written by a newer build.
    #[error("store version {found} is newer than supported version {supported}",
            supported = SUPPORTED_VERSION)]
    TooNew {
        /// Version found in the store.
        found: i64,
    },
    /// The chain crosses an irreversible boundary.
    #[error("no migration path through version {missing}")]
    TooHard {
        /// First target version with no migration function.
        missing: i64,
    },
    /// A step found the store at the wrong source version.
    #[error("migration step expected version {expected}, found {found}")]
    VersionMismatch {
        /// Version the step requires.
        expected: i64,
        /// Version actually recorded.
        found: i64,
    },
    /// A predefined config is not at its fixed row id.
    #[error("predefined config {uuid} is not at rid {expected_rid}")]
    PredefinedConfig {
        /// Uuid of the displaced config.
        uuid: String,
        /// Row id the config must occupy.
        expected_rid: i64,
    },
    /// The pre-migration backup failed.
    #[error("store backup failed: {0}")]
    Backup(String),
}

// ============================================================================
// SECTION: Version Inspection
// ============================================================================

/// Startup classification of the store's recorded version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    /// The store is at the supported version.
    Current,
    /// The store has no `meta` table or no recorded version.
    Uninitialized,
    /// The store is older and needs an explicit `migrate`.
    NeedsMigration(i64),
    /// The store was written by a newer build.
    TooNew(i64),
}

/// Reads the recorded schema version; -1 when `meta` is absent or empty.
///
/// # Errors
///
/// Returns [`StoreError`] on engine failure.
pub fn current_version(store: &mut Store) -> Result<i64, StoreError> {
    store.immediate(|tx| {
        let has_meta = tx.opt_i64(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'meta'",
            [],
        )?;
        if has_meta.is_none() {
            return Ok(-1);
        }
        let value =
            tx.opt_string("SELECT value FROM meta WHERE name = 'database_version'", [])?;
        Ok(value.and_then(|text| text.parse().ok()).unwrap_or(-1))
    })
}

/// Classifies the store version for startup.
///
/// # Errors
///
/// Returns [`StoreError`] on engine failure.
pub fn version_status(store: &mut Store) -> Result<VersionStatus, StoreError> {
    let version = current_version(store)?;
    Ok(match version {
        SUPPORTED_VERSION => VersionStatus::Current,
        v if v < 0 => VersionStatus::Uninitialized,
        v if v < SUPPORTED_VERSION => VersionStatus::NeedsMigration(v),
        v => VersionStatus::TooNew(v),
    })
}

// ============================================================================
// SECTION: Backup
// ============================================================================

/// Copies the store file and its WAL sidecar to `.bak` siblings inside an
/// exclusive transaction, so the copy observes a committed snapshot.
/// Returns the backup path, or `None` for in-memory stores.
///
/// # Errors
///
/// Returns [`MigrateError::Backup`] on copy failure.
pub fn backup_store(store: &mut Store) -> Result<Option<PathBuf>, MigrateError> {
    let Some(path) = store.path().map(std::path::Path::to_path_buf) else {
        return Ok(None);
    };
    store.exclusive(|_tx| {
        let backup = bak_path(&path);
        fs::copy(&path, &backup).map_err(|err| MigrateError::Backup(err.to_string()))?;
        let wal = wal_path(&path);
        if wal.exists() {
            fs::copy(&wal, bak_path(&wal))
                .map_err(|err| MigrateError::Backup(err.to_string()))?;
        }
        Ok(Some(backup))
    })
}

/// Appends the `.bak` suffix to a path.
fn bak_path(path: &std::path::Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Derives the WAL sidecar path.
fn wal_path(path: &std::path::Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("-wal");
    PathBuf::from(name)
}

// ============================================================================
// SECTION: Migration Driver
// ============================================================================

/// Outcome of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateOutcome {
    /// The chain ran; the store advanced.
    Migrated {
        /// Version before the run.
        from: i64,
        /// Version after the run (the supported version).
        to: i64,
    },
    /// The store was already at the supported version.
    AlreadyCurrent,
}

/// One migration step body.
type Migrator = fn(&mut Store) -> Result<(), MigrateError>;

/// The ordered chain. Entry `k` targets version `k + 1`; a `None` would
/// mark an irreversible boundary.
const MIGRATORS: [(i64, Option<Migrator>); 36] = [
    (1, Some(migrate_1)),
    (2, Some(migrate_2)),
    (3, Some(migrate_3)),
    (4, Some(migrate_4)),
    (5, Some(migrate_5)),
    (6, Some(migrate_6)),
    (7, Some(migrate_7)),
    (8, Some(migrate_8)),
    (9, Some(migrate_9)),
    (10, Some(migrate_10)),
    (11, Some(migrate_11)),
    (12, Some(migrate_12)),
    (13, Some(migrate_13)),
    (14, Some(migrate_14)),
    (15, Some(migrate_15)),
    (16, Some(migrate_16)),
    (17, Some(migrate_17)),
    (18, Some(migrate_18)),
    (19, Some(migrate_19)),
    (20, Some(migrate_20)),
    (21, Some(migrate_21)),
    (22, Some(migrate_22)),
    (23, Some(migrate_23)),
    (24, Some(migrate_24)),
    (25, Some(migrate_25)),
    (26, Some(migrate_26)),
    (27, Some(migrate_27)),
    (28, Some(migrate_28)),
    (29, Some(migrate_29)),
    (30, Some(migrate_30)),
    (31, Some(migrate_31)),
    (32, Some(migrate_32)),
    (33, Some(migrate_33)),
    (34, Some(migrate_34)),
    (35, Some(migrate_35)),
    (36, Some(migrate_36)),
];

/// Advances the store to [`SUPPORTED_VERSION`].
///
/// Availability is checked before anything runs: if any step in the chain
/// is missing, the store is untouched. A backup is taken first. After the
/// chain, `ANALYZE` runs; `VACUUM` runs when a data-moving step ran.
///
/// # Errors
///
/// Returns [`MigrateError`] on an unavailable chain, a failed step, or a
/// failed backup. A failed step leaves the store at the version of the
/// last successful step.
pub fn migrate(store: &mut Store) -> Result<MigrateOutcome, MigrateError> {
    let from = current_version(store)?;
    if from == SUPPORTED_VERSION {
        return Ok(MigrateOutcome::AlreadyCurrent);
    }
    if from > SUPPORTED_VERSION {
        return Err(MigrateError::TooNew {
            found: from,
        });
    }
    if from < 0 {
        return Err(MigrateError::NotInitialized);
    }
    for (target, step) in &MIGRATORS {
        if *target > from && step.is_none() {
            return Err(MigrateError::TooHard {
                missing: *target,
            });
        }
    }
    backup_store(store)?;
    let mut moved_data = false;
    for (target, step) in MIGRATORS {
        if target <= from {
            continue;
        }
        let Some(run) = step else {
            return Err(MigrateError::TooHard {
                missing: target,
            });
        };
        run(store)?;
        info!(version = target, "migrated store");
        if DATA_MOVING_STEPS.contains(&target) {
            moved_data = true;
        }
    }
    store.execute_batch("ANALYZE")?;
    if moved_data {
        store.execute_batch("VACUUM")?;
    }
    Ok(MigrateOutcome::Migrated {
        from,
        to: SUPPORTED_VERSION,
    })
}

// ============================================================================
// SECTION: Step Plumbing
// ============================================================================

/// Reads the recorded version inside a step transaction.
fn read_version(tx: &Tx<'_>) -> Result<i64, MigrateError> {
    let value = tx.opt_string("SELECT value FROM meta WHERE name = 'database_version'", [])?;
    value.and_then(|text| text.parse().ok()).ok_or(MigrateError::NotInitialized)
}

/// Writes the recorded version inside a step transaction.
fn write_version(tx: &Tx<'_>, version: i64) -> Result<(), MigrateError> {
    tx.exec(
        "UPDATE meta SET value = ?1 WHERE name = 'database_version'",
        params![version.to_string()],
    )?;
    Ok(())
}

/// Runs one step: exclusive transaction, source-version check, body,
/// version bump, commit.
fn step(
    store: &mut Store,
    target: i64,
    body: impl FnOnce(&Tx<'_>) -> Result<(), MigrateError>,
) -> Result<(), MigrateError> {
    store.exclusive(|tx| {
        let found = read_version(tx)?;
        if found != target - 1 {
            return Err(MigrateError::VersionMismatch {
                expected: target - 1,
                found,
            });
        }
        body(tx)?;
        write_version(tx, target)
    })
}

// ============================================================================
// SECTION: Migration Steps
// ============================================================================

/// v0 -> v1: tasks gain a free-form description column.
fn migrate_1(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 1, |tx| {
        tx.exec_batch("ALTER TABLE tasks ADD COLUMN description TEXT;")?;
        Ok(())
    })
}

/// v1 -> v2: reports record their own scan run status, backfilled from the
/// owning task so finished reports read as Done.
fn migrate_2(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 2, |tx| {
        tx.exec_batch(
            "ALTER TABLE reports ADD COLUMN scan_run_status INTEGER NOT NULL DEFAULT 1;
             UPDATE reports SET scan_run_status =
                 coalesce((SELECT run_status FROM tasks WHERE tasks.rid = reports.task), 1);",
        )?;
        Ok(())
    })
}

/// v2 -> v3: canonical per-NVT preference defaults get their own table.
fn migrate_3(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 3, |tx| {
        tx.exec_batch(
            "CREATE TABLE nvt_preferences (
                 rid INTEGER PRIMARY KEY,
                 name TEXT UNIQUE NOT NULL,
                 value TEXT);",
        )?;
        Ok(())
    })
}

/// v3 -> v4: the NVT cache carries CVSS base scores and risk factors.
fn migrate_4(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 4, |tx| {
        tx.exec_batch(
            "ALTER TABLE nvts ADD COLUMN cvss_base TEXT;
             ALTER TABLE nvts ADD COLUMN risk_factor TEXT;",
        )?;
        Ok(())
    })
}

/// v4 -> v5: configs cache family/NVT counts and growing flags. Counts are
/// stamped to zero; the selector engine recomputes them on first touch.
/// Growing flags derive from the presence of an include-everything rule.
fn migrate_5(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 5, |tx| {
        tx.exec_batch(
            "ALTER TABLE configs ADD COLUMN family_count INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE configs ADD COLUMN nvt_count INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE configs ADD COLUMN families_growing INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE configs ADD COLUMN nvts_growing INTEGER NOT NULL DEFAULT 0;
             UPDATE configs SET families_growing = CASE WHEN EXISTS
                 (SELECT 1 FROM nvt_selectors
                  WHERE name = configs.nvt_selector AND type = 0 AND exclude = 0)
                 THEN 1 ELSE 0 END;
             UPDATE configs SET nvts_growing = families_growing;",
        )?;
        Ok(())
    })
}

/// v5 -> v6: the predefined configs must sit at their fixed rids 1-4. A
/// displaced config aborts the chain; the operator must repair the store
/// by hand before retrying. No renumbering is attempted.
fn migrate_6(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 6, |tx| {
        let fixed: [(i64, &str); 4] = [
            (1, CONFIG_UUID_FULL_AND_FAST),
            (2, CONFIG_UUID_FULL_AND_FAST_ULTIMATE),
            (3, CONFIG_UUID_FULL_AND_VERY_DEEP),
            (4, CONFIG_UUID_FULL_AND_VERY_DEEP_ULTIMATE),
        ];
        for (expected_rid, uuid) in fixed {
            let rid = tx.opt_i64("SELECT rid FROM configs WHERE uuid = ?1", params![uuid])?;
            if rid != Some(expected_rid) {
                return Err(MigrateError::PredefinedConfig {
                    uuid: uuid.to_string(),
                    expected_rid,
                });
            }
        }
        Ok(())
    })
}

/// v6 -> v7: local security check credentials arrive; targets reference
/// them.
fn migrate_7(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 7, |tx| {
        tx.exec_batch(
            "CREATE TABLE lsc_credentials (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 owner INTEGER REFERENCES users (rid),
                 name TEXT NOT NULL,
                 login TEXT,
                 password TEXT,
                 comment TEXT,
                 public_key TEXT,
                 private_key TEXT);
             ALTER TABLE targets ADD COLUMN lsc_credential INTEGER NOT NULL DEFAULT 0;",
        )?;
        Ok(())
    })
}

/// v7 -> v8: tasks record scan start and end times.
fn migrate_8(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 8, |tx| {
        tx.exec_batch(
            "ALTER TABLE tasks ADD COLUMN start_time INTEGER;
             ALTER TABLE tasks ADD COLUMN end_time INTEGER;",
        )?;
        Ok(())
    })
}

/// v8 -> v9: tasks.owner becomes a nullable integer reference. Legacy
/// empty-string owners become NULL, never 0; any numeric text casts
/// through. The table is rebuilt, so the step is data-moving.
fn migrate_9(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 9, |tx| {
        tx.exec_batch(
            "CREATE TABLE tasks_9 (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 owner INTEGER REFERENCES users (rid),
                 name TEXT NOT NULL,
                 hidden INTEGER NOT NULL DEFAULT 0,
                 comment TEXT,
                 description TEXT,
                 run_status INTEGER NOT NULL,
                 start_time INTEGER,
                 end_time INTEGER,
                 config INTEGER NOT NULL DEFAULT 0,
                 target INTEGER NOT NULL DEFAULT 0);
             INSERT INTO tasks_9 (rid, uuid, owner, name, hidden, comment, description,
                                  run_status, start_time, end_time, config, target)
                 SELECT rid, uuid,
                        CASE WHEN owner IS NULL OR owner = '' THEN NULL
                             ELSE CAST (owner AS INTEGER) END,
                        name, coalesce(hidden, 0), comment, description, run_status,
                        start_time, end_time, coalesce(config, 0), coalesce(target, 0)
                 FROM tasks;
             DROP TABLE tasks;
             ALTER TABLE tasks_9 RENAME TO tasks;",
        )?;
        Ok(())
    })
}

/// v9 -> v10: agents with installer payloads and trust bookkeeping.
fn migrate_10(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 10, |tx| {
        tx.exec_batch(
            "CREATE TABLE agents (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 owner INTEGER REFERENCES users (rid),
                 name TEXT NOT NULL,
                 comment TEXT,
                 installer BLOB,
                 installer_64 TEXT,
                 installer_filename TEXT,
                 installer_signature_64 TEXT,
                 installer_trust INTEGER NOT NULL DEFAULT 0,
                 howto_install TEXT,
                 howto_use TEXT);",
        )?;
        Ok(())
    })
}

/// v10 -> v11: escalators, their three parameter side tables, and the
/// task binding table.
fn migrate_11(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 11, |tx| {
        tx.exec_batch(
            "CREATE TABLE escalators (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 owner INTEGER REFERENCES users (rid),
                 name TEXT NOT NULL,
                 comment TEXT,
                 event INTEGER NOT NULL,
                 condition INTEGER NOT NULL,
                 method INTEGER NOT NULL);
             CREATE TABLE escalator_condition_data (
                 rid INTEGER PRIMARY KEY,
                 escalator INTEGER NOT NULL,
                 name TEXT,
                 data TEXT);
             CREATE TABLE escalator_event_data (
                 rid INTEGER PRIMARY KEY,
                 escalator INTEGER NOT NULL,
                 name TEXT,
                 data TEXT);
             CREATE TABLE escalator_method_data (
                 rid INTEGER PRIMARY KEY,
                 escalator INTEGER NOT NULL,
                 name TEXT,
                 data TEXT);
             CREATE TABLE task_escalators (
                 rid INTEGER PRIMARY KEY,
                 task INTEGER NOT NULL,
                 escalator INTEGER NOT NULL);",
        )?;
        Ok(())
    })
}

/// v11 -> v12: notes attach commentary to matching results.
fn migrate_12(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 12, |tx| {
        tx.exec_batch(
            "CREATE TABLE notes (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 owner INTEGER REFERENCES users (rid),
                 nvt TEXT NOT NULL,
                 creation_time INTEGER,
                 text TEXT,
                 hosts TEXT,
                 port TEXT,
                 threat TEXT,
                 task INTEGER NOT NULL DEFAULT 0,
                 result INTEGER NOT NULL DEFAULT 0);",
        )?;
        Ok(())
    })
}

/// v12 -> v13: notes track modification separately from creation.
fn migrate_13(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 13, |tx| {
        tx.exec_batch(
            "ALTER TABLE notes ADD COLUMN modification_time INTEGER;
             UPDATE notes SET modification_time = creation_time;",
        )?;
        Ok(())
    })
}

/// v13 -> v14: schedules arrive; tasks cache their next fire time.
fn migrate_14(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 14, |tx| {
        tx.exec_batch(
            "CREATE TABLE schedules (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 owner INTEGER REFERENCES users (rid),
                 name TEXT NOT NULL,
                 comment TEXT,
                 first_time INTEGER NOT NULL,
                 period INTEGER NOT NULL DEFAULT 0,
                 period_months INTEGER NOT NULL DEFAULT 0);
             ALTER TABLE tasks ADD COLUMN schedule INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE tasks ADD COLUMN schedule_next_time INTEGER NOT NULL DEFAULT 0;",
        )?;
        Ok(())
    })
}

/// v14 -> v15: overrides: notes that also reassign effective severity.
fn migrate_15(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 15, |tx| {
        tx.exec_batch(
            "CREATE TABLE overrides (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 owner INTEGER REFERENCES users (rid),
                 nvt TEXT NOT NULL,
                 creation_time INTEGER,
                 modification_time INTEGER,
                 text TEXT,
                 hosts TEXT,
                 port TEXT,
                 threat TEXT,
                 new_threat TEXT,
                 task INTEGER NOT NULL DEFAULT 0,
                 result INTEGER NOT NULL DEFAULT 0);",
        )?;
        Ok(())
    })
}

/// v15 -> v16: results gain stable uuids, freshly generated per row.
fn migrate_16(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 16, |tx| {
        tx.exec_batch(
            "ALTER TABLE results ADD COLUMN uuid TEXT;
             UPDATE results SET uuid = make_uuid();
             CREATE UNIQUE INDEX results_by_uuid ON results (uuid);",
        )?;
        Ok(())
    })
}

/// v16 -> v17: slaves arrive; tasks may delegate and reports track the
/// remote scan.
fn migrate_17(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 17, |tx| {
        tx.exec_batch(
            "CREATE TABLE slaves (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 owner INTEGER REFERENCES users (rid),
                 name TEXT NOT NULL,
                 comment TEXT,
                 host TEXT,
                 port INTEGER,
                 login TEXT,
                 password TEXT);
             ALTER TABLE tasks ADD COLUMN slave INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE reports ADD COLUMN slave_progress INTEGER NOT NULL DEFAULT 0;
             ALTER TABLE reports ADD COLUMN slave_task_uuid TEXT;",
        )?;
        Ok(())
    })
}

/// v17 -> v18: targets may carry a second, SMB credential.
fn migrate_18(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 18, |tx| {
        tx.exec_batch(
            "ALTER TABLE targets ADD COLUMN smb_lsc_credential INTEGER NOT NULL DEFAULT 0;",
        )?;
        Ok(())
    })
}

/// v18 -> v19: targets carry a port range expression.
fn migrate_19(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 19, |tx| {
        tx.exec_batch(
            "ALTER TABLE targets ADD COLUMN port_range TEXT NOT NULL DEFAULT 'default';",
        )?;
        Ok(())
    })
}

/// v19 -> v20: report formats become store entities; the eight predefined
/// formats are seeded trusted and active.
fn migrate_20(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 20, |tx| {
        tx.exec_batch(
            "CREATE TABLE report_formats (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 owner INTEGER REFERENCES users (rid),
                 name TEXT NOT NULL,
                 extension TEXT,
                 content_type TEXT,
                 summary TEXT,
                 description TEXT,
                 signature TEXT,
                 trust INTEGER NOT NULL DEFAULT 3,
                 trust_time INTEGER,
                 flags INTEGER NOT NULL DEFAULT 0);
             CREATE TABLE report_format_params (
                 rid INTEGER PRIMARY KEY,
                 report_format INTEGER NOT NULL,
                 name TEXT NOT NULL,
                 type INTEGER NOT NULL,
                 value TEXT);
             CREATE TABLE report_format_param_options (
                 rid INTEGER PRIMARY KEY,
                 report_format_param INTEGER NOT NULL,
                 value TEXT);",
        )?;
        seed_report_formats(tx)?;
        Ok(())
    })
}

/// v20 -> v21: report format parameters learn defaults and numeric bounds.
fn migrate_21(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 21, |tx| {
        tx.exec_batch(
            "ALTER TABLE report_format_params ADD COLUMN default_value TEXT;
             ALTER TABLE report_format_params ADD COLUMN min_value INTEGER;
             ALTER TABLE report_format_params ADD COLUMN max_value INTEGER;
             UPDATE report_format_params SET default_value = value;",
        )?;
        Ok(())
    })
}

/// v21 -> v22: agents record when their trust was last derived.
fn migrate_22(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 22, |tx| {
        tx.exec_batch("ALTER TABLE agents ADD COLUMN installer_trust_time INTEGER;")?;
        Ok(())
    })
}

/// v22 -> v23: credentials store generated installer packages.
fn migrate_23(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 23, |tx| {
        tx.exec_batch(
            "ALTER TABLE lsc_credentials ADD COLUMN rpm BLOB;
             ALTER TABLE lsc_credentials ADD COLUMN deb BLOB;
             ALTER TABLE lsc_credentials ADD COLUMN exe BLOB;",
        )?;
        Ok(())
    })
}

/// v23 -> v24: repairs the v9 coercion: any entity still owned by the
/// non-existent user 0 becomes global (owner NULL). Data-moving.
fn migrate_24(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 24, |tx| {
        for table in [
            "tasks",
            "configs",
            "targets",
            "lsc_credentials",
            "agents",
            "schedules",
            "slaves",
            "reports",
            "notes",
            "overrides",
            "escalators",
            "report_formats",
        ] {
            // Table names come from this fixed list, never from input.
            let sql = format!("UPDATE {table} SET owner = NULL WHERE owner = 0");
            tx.exec(&sql, [])?;
        }
        Ok(())
    })
}

/// v24 -> v25: hot-path indices.
fn migrate_25(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 25, |tx| {
        tx.exec_batch(
            "CREATE INDEX IF NOT EXISTS tasks_by_owner ON tasks (owner);
             CREATE INDEX IF NOT EXISTS results_by_task ON results (task);
             CREATE INDEX IF NOT EXISTS reports_by_task ON reports (task);
             CREATE INDEX IF NOT EXISTS report_results_by_report ON report_results (report);
             CREATE INDEX IF NOT EXISTS nvt_selectors_by_name ON nvt_selectors (name);
             CREATE INDEX IF NOT EXISTS notes_by_nvt ON notes (nvt);
             CREATE INDEX IF NOT EXISTS overrides_by_nvt ON overrides (nvt);",
        )?;
        Ok(())
    })
}

/// v25 -> v26: reports can be hidden; the example report is.
fn migrate_26(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 26, |tx| {
        tx.exec_batch("ALTER TABLE reports ADD COLUMN hidden INTEGER NOT NULL DEFAULT 0;")?;
        tx.exec(
            "UPDATE reports SET hidden = 1 WHERE uuid = ?1",
            params![REPORT_UUID_EXAMPLE],
        )?;
        Ok(())
    })
}

/// v26 -> v27: agent trust moves to the shared code set (0 error, 1 yes,
/// 2 no, 3 unknown); the legacy 0-means-unknown rows recode to 3.
fn migrate_27(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 27, |tx| {
        tx.exec_batch("UPDATE agents SET installer_trust = 3 WHERE installer_trust = 0;")?;
        Ok(())
    })
}

/// v27 -> v28: the NVT cache records feed signing key ids.
fn migrate_28(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 28, |tx| {
        tx.exec_batch("ALTER TABLE nvts ADD COLUMN sign_key_ids TEXT;")?;
        Ok(())
    })
}

/// v28 -> v29: threat-level conditions switch from raw severity labels to
/// threat tokens in their `level` parameter.
fn migrate_29(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 29, |tx| {
        tx.exec_batch(
            "UPDATE escalator_condition_data SET data = 'High'
                 WHERE name = 'level' AND data = 'Security Hole';
             UPDATE escalator_condition_data SET data = 'Medium'
                 WHERE name = 'level' AND data = 'Security Warning';
             UPDATE escalator_condition_data SET data = 'Low'
                 WHERE name = 'level' AND data = 'Security Note';",
        )?;
        Ok(())
    })
}

/// v29 -> v30: empty-string passwords normalize to NULL.
fn migrate_30(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 30, |tx| {
        tx.exec_batch("UPDATE users SET password = NULL WHERE password = '';")?;
        Ok(())
    })
}

/// v30 -> v31: tasks, results, and report_results are rebuilt with NOT
/// NULL constraints matching the bootstrap schema. Data-moving.
fn migrate_31(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 31, |tx| {
        tx.exec_batch(
            "CREATE TABLE tasks_31 (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 owner INTEGER REFERENCES users (rid),
                 name TEXT NOT NULL,
                 hidden INTEGER NOT NULL DEFAULT 0,
                 comment TEXT,
                 description TEXT,
                 run_status INTEGER NOT NULL,
                 start_time INTEGER,
                 end_time INTEGER,
                 config INTEGER NOT NULL DEFAULT 0,
                 target INTEGER NOT NULL DEFAULT 0,
                 schedule INTEGER NOT NULL DEFAULT 0,
                 schedule_next_time INTEGER NOT NULL DEFAULT 0,
                 slave INTEGER NOT NULL DEFAULT 0);
             INSERT INTO tasks_31 (rid, uuid, owner, name, hidden, comment, description,
                                   run_status, start_time, end_time, config, target,
                                   schedule, schedule_next_time, slave)
                 SELECT rid, uuid, owner, name, hidden, comment, description, run_status,
                        start_time, end_time, config, target, coalesce(schedule, 0),
                        coalesce(schedule_next_time, 0), coalesce(slave, 0)
                 FROM tasks;
             DROP TABLE tasks;
             ALTER TABLE tasks_31 RENAME TO tasks;
             CREATE INDEX tasks_by_owner ON tasks (owner);
             CREATE TABLE results_31 (
                 rid INTEGER PRIMARY KEY,
                 uuid TEXT UNIQUE NOT NULL,
                 task INTEGER NOT NULL,
                 subnet TEXT,
                 host TEXT,
                 port TEXT,
                 nvt TEXT,
                 type TEXT,
                 description TEXT);
             INSERT INTO results_31 (rid, uuid, task, subnet, host, port, nvt, type,
                                     description)
                 SELECT rid, uuid, coalesce(task, 0), subnet, host, port, nvt, type,
                        description
                 FROM results;
             DROP TABLE results;
             ALTER TABLE results_31 RENAME TO results;
             CREATE INDEX results_by_task ON results (task);
             CREATE TABLE report_results_31 (
                 rid INTEGER PRIMARY KEY,
                 report INTEGER NOT NULL,
                 result INTEGER NOT NULL);
             INSERT INTO report_results_31 (rid, report, result)
                 SELECT rid, report, result FROM report_results;
             DROP TABLE report_results;
             ALTER TABLE report_results_31 RENAME TO report_results;
             CREATE INDEX report_results_by_report ON report_results (report);",
        )?;
        Ok(())
    })
}

/// v31 -> v32: schedules learn a windowed duration.
fn migrate_32(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 32, |tx| {
        tx.exec_batch(
            "ALTER TABLE schedules ADD COLUMN duration INTEGER NOT NULL DEFAULT 0;",
        )?;
        Ok(())
    })
}

/// v32 -> v33: per-NVT config preferences are tagged PLUGINS_PREFS based
/// on their `<nvt-name>[<type>]:<pref-name>` naming pattern.
fn migrate_33(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 33, |tx| {
        tx.exec_batch(
            "UPDATE config_preferences SET type = 'PLUGINS_PREFS'
                 WHERE type IS NULL AND name LIKE '%[%]:%';",
        )?;
        Ok(())
    })
}

/// v33 -> v34: report hosts track port sweep progress.
fn migrate_34(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 34, |tx| {
        tx.exec_batch(
            "ALTER TABLE report_hosts ADD COLUMN current_port INTEGER;
             ALTER TABLE report_hosts ADD COLUMN max_port INTEGER;",
        )?;
        Ok(())
    })
}

/// v34 -> v35: reports with no recorded date inherit their start time.
fn migrate_35(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 35, |tx| {
        tx.exec_batch("UPDATE reports SET date = start_time WHERE date IS NULL;")?;
        Ok(())
    })
}

/// v35 -> v36: binding-table indices for escalator dispatch.
fn migrate_36(store: &mut Store) -> Result<(), MigrateError> {
    step(store, 36, |tx| {
        tx.exec_batch(
            "CREATE INDEX IF NOT EXISTS task_escalators_by_task ON task_escalators (task);
             CREATE INDEX IF NOT EXISTS escalator_condition_data_by_escalator
                 ON escalator_condition_data (escalator);
             CREATE INDEX IF NOT EXISTS escalator_event_data_by_escalator
                 ON escalator_event_data (escalator);
             CREATE INDEX IF NOT EXISTS escalator_method_data_by_escalator
                 ON escalator_method_data (escalator);",
        )?;
        Ok(())
    })
}
