// crates/scan-manager-store/tests/migrate_chain.rs
// ============================================================================
// Module: Migration Chain Integration Tests
// Description: Drives the full version-0 to supported-version chain.
// Purpose: Validate step ordering, data repair, idempotence, and the
//          predefined-config guard.
// ============================================================================

//! ## Overview
//! Builds a store at the documented version-0 schema, runs the full chain,
//! and checks the data-repair semantics the steps promise: text owners
//! become nullable integers, results gain uuids, NVT preferences get
//! tagged, and a displaced predefined config aborts the chain at its
//! previous consistent version.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use scan_manager_store::MigrateError;
use scan_manager_store::MigrateOutcome;
use scan_manager_store::SUPPORTED_VERSION;
use scan_manager_store::Store;
use scan_manager_store::current_version;
use scan_manager_store::migrate;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// The version-0 schema, as documented on the migrator module.
const V0_SCHEMA: &str = "\
CREATE TABLE meta (rid INTEGER PRIMARY KEY, name TEXT UNIQUE NOT NULL, value TEXT);
CREATE TABLE users (rid INTEGER PRIMARY KEY, uuid TEXT UNIQUE NOT NULL,
                    name TEXT NOT NULL, password TEXT);
CREATE TABLE tasks (rid INTEGER PRIMARY KEY, uuid TEXT UNIQUE NOT NULL, owner TEXT,
                    name TEXT NOT NULL, hidden INTEGER, comment TEXT,
                    run_status INTEGER NOT NULL, config INTEGER, target INTEGER);
CREATE TABLE configs (rid INTEGER PRIMARY KEY, uuid TEXT UNIQUE NOT NULL, owner INTEGER,
                      name TEXT NOT NULL, nvt_selector TEXT NOT NULL, comment TEXT);
CREATE TABLE config_preferences (rid INTEGER PRIMARY KEY, config INTEGER NOT NULL,
                                 type TEXT, name TEXT NOT NULL, value TEXT);
CREATE TABLE nvt_selectors (rid INTEGER PRIMARY KEY, name TEXT NOT NULL,
                            exclude INTEGER NOT NULL DEFAULT 0, type INTEGER NOT NULL,
                            family_or_nvt TEXT, family TEXT);
CREATE TABLE nvts (rid INTEGER PRIMARY KEY, oid TEXT UNIQUE NOT NULL, version TEXT,
                   name TEXT, summary TEXT, description TEXT, copyright TEXT, cve TEXT,
                   bid TEXT, xref TEXT, tag TEXT, category INTEGER, family TEXT);
CREATE TABLE targets (rid INTEGER PRIMARY KEY, uuid TEXT UNIQUE NOT NULL, owner INTEGER,
                      name TEXT NOT NULL, hosts TEXT NOT NULL, comment TEXT);
CREATE TABLE reports (rid INTEGER PRIMARY KEY, uuid TEXT UNIQUE NOT NULL, owner INTEGER,
                      task INTEGER, date INTEGER, start_time INTEGER, end_time INTEGER,
                      comment TEXT);
CREATE TABLE report_hosts (rid INTEGER PRIMARY KEY, report INTEGER NOT NULL, host TEXT,
                           start_time INTEGER, end_time INTEGER);
CREATE TABLE results (rid INTEGER PRIMARY KEY, task INTEGER, subnet TEXT, host TEXT,
                      port TEXT, nvt TEXT, type TEXT, description TEXT);
CREATE TABLE report_results (rid INTEGER PRIMARY KEY, report INTEGER NOT NULL,
                             result INTEGER NOT NULL);
INSERT INTO meta (name, value) VALUES ('database_version', '0');
INSERT INTO users (uuid, name) VALUES ('0e5f2e48-7d12-4f5b-b128-3c64f51e292d', 'om');
INSERT INTO nvt_selectors (name, exclude, type)
    VALUES ('54b45713-d4f4-4435-b20d-304c175ed8c5', 0, 0);
INSERT INTO configs (rid, uuid, name, nvt_selector)
    VALUES (1, 'daba56c8-73ec-11df-a475-002264764cea', 'Full and fast',
            '54b45713-d4f4-4435-b20d-304c175ed8c5');
INSERT INTO configs (rid, uuid, name, nvt_selector)
    VALUES (2, '698f691e-7489-11df-9d8c-002264764cea', 'Full and fast ultimate',
            '54b45713-d4f4-4435-b20d-304c175ed8c5');
INSERT INTO configs (rid, uuid, name, nvt_selector)
    VALUES (3, '708f25c4-7489-11df-8094-002264764cea', 'Full and very deep',
            '54b45713-d4f4-4435-b20d-304c175ed8c5');
INSERT INTO configs (rid, uuid, name, nvt_selector)
    VALUES (4, '74db13d6-7489-11df-91b9-002264764cea', 'Full and very deep ultimate',
            '54b45713-d4f4-4435-b20d-304c175ed8c5');
INSERT INTO config_preferences (config, type, name, value)
    VALUES (1, NULL, 'Ping Host[checkbox]:Mark unrechable Hosts as dead', 'yes');
INSERT INTO targets (uuid, owner, name, hosts)
    VALUES ('b493b7a8-7489-11df-a3ec-002264764cea', NULL, 'Localhost', 'localhost');
INSERT INTO tasks (uuid, owner, name, hidden, run_status, config, target)
    VALUES ('11111111-2222-4333-8444-555555555555', '', 'Legacy scan', 0, 12, 1, 1);
INSERT INTO reports (uuid, task, date, start_time, end_time)
    VALUES ('22222222-3333-4444-8555-666666666666', 1, 1300000000, 1300000000, NULL);
INSERT INTO results (task, subnet, host, port, nvt, type, description)
    VALUES (1, '', '10.0.0.7', '80/tcp', '1.3.6.1.4.1.25623.1.0.100315',
            'Security Warning', 'Something looked off.');
INSERT INTO report_results (report, result) VALUES (1, 1);
";

/// Opens a file-backed store seeded at version 0.
fn v0_store(dir: &TempDir) -> Store {
    let path = dir.path().join("tasks.db");
    let mut store = Store::open(&path).expect("open store");
    store.exclusive(|tx| tx.exec_batch(V0_SCHEMA)).expect("seed v0");
    store
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn full_chain_reaches_supported_version() {
    let dir = TempDir::new().unwrap();
    let mut store = v0_store(&dir);
    let outcome = migrate(&mut store).unwrap();
    assert_eq!(
        outcome,
        MigrateOutcome::Migrated {
            from: 0,
            to: SUPPORTED_VERSION,
        }
    );
    assert_eq!(current_version(&mut store).unwrap(), SUPPORTED_VERSION);
}

#[test]
fn rerunning_migrate_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let mut store = v0_store(&dir);
    migrate(&mut store).unwrap();
    assert_eq!(migrate(&mut store).unwrap(), MigrateOutcome::AlreadyCurrent);
}

#[test]
fn empty_text_owner_becomes_null_not_zero() {
    let dir = TempDir::new().unwrap();
    let mut store = v0_store(&dir);
    migrate(&mut store).unwrap();
    let nulls = store
        .immediate(|tx| tx.scalar_i64("SELECT count(*) FROM tasks WHERE owner IS NULL", []))
        .unwrap();
    assert_eq!(nulls, 1);
    let zeros = store
        .immediate(|tx| tx.scalar_i64("SELECT count(*) FROM tasks WHERE owner = 0", []))
        .unwrap();
    assert_eq!(zeros, 0);
}

#[test]
fn results_gain_stable_uuids() {
    let dir = TempDir::new().unwrap();
    let mut store = v0_store(&dir);
    migrate(&mut store).unwrap();
    let uuid = store
        .immediate(|tx| tx.scalar_string("SELECT uuid FROM results WHERE rid = 1", []))
        .unwrap();
    assert_eq!(uuid.len(), 36);
}

#[test]
fn nvt_preferences_get_tagged_plugins_prefs() {
    let dir = TempDir::new().unwrap();
    let mut store = v0_store(&dir);
    migrate(&mut store).unwrap();
    let tagged = store
        .immediate(|tx| {
            tx.scalar_string(
                "SELECT type FROM config_preferences WHERE name LIKE 'Ping Host%'",
                [],
            )
        })
        .unwrap();
    assert_eq!(tagged, "PLUGINS_PREFS");
}

#[test]
fn report_formats_are_seeded_by_the_chain() {
    let dir = TempDir::new().unwrap();
    let mut store = v0_store(&dir);
    migrate(&mut store).unwrap();
    let formats = store
        .immediate(|tx| tx.scalar_i64("SELECT count(*) FROM report_formats", []))
        .unwrap();
    assert_eq!(formats, 8);
}

#[test]
fn migration_writes_a_backup_sidecar() {
    let dir = TempDir::new().unwrap();
    let mut store = v0_store(&dir);
    migrate(&mut store).unwrap();
    assert!(dir.path().join("tasks.db.bak").exists());
}

#[test]
fn displaced_predefined_config_aborts_at_version_five() {
    let dir = TempDir::new().unwrap();
    let mut store = v0_store(&dir);
    store
        .exclusive(|tx| {
            tx.exec("UPDATE configs SET rid = 9 WHERE rid = 2", [])?;
            tx.exec("UPDATE tasks SET config = 9 WHERE config = 2", [])
        })
        .expect("displace config");
    let error = migrate(&mut store).unwrap_err();
    assert!(matches!(error, MigrateError::PredefinedConfig { expected_rid: 2, .. }));
    // Steps 1-5 committed; the guard step rolled back.
    assert_eq!(current_version(&mut store).unwrap(), 5);
}

#[test]
fn migrating_an_uninitialized_store_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tasks.db");
    let mut store = Store::open(&path).unwrap();
    let error = migrate(&mut store).unwrap_err();
    assert!(matches!(error, MigrateError::NotInitialized));
}
