// crates/scan-manager-store/src/schema.rs
// ============================================================================
// Module: Current Schema and Seed Data
// Description: DDL for the supported schema version plus predefined rows.
// Purpose: Bootstrap a fresh store at the supported version with the
//          predefined configs, target, user, example task, and formats.
// Dependencies: crate::{migrate, store}, rusqlite
// ============================================================================

//! ## Overview
//! A fresh store is created directly at [`crate::migrate::SUPPORTED_VERSION`];
//! only pre-existing stores go through the migration chain. Initialization
//! is idempotent: tables use `IF NOT EXISTS` and seed rows key on their
//! fixed uuids. Predefined entities are never deleted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;

use crate::migrate::SUPPORTED_VERSION;
use crate::store::Store;
use crate::store::StoreError;
use crate::store::Tx;

// ============================================================================
// SECTION: Fixed Identifiers
// ============================================================================

/// Uuid of the predefined "all" NVT selector.
pub const SELECTOR_UUID_ALL: &str = "54b45713-d4f4-4435-b20d-304c175ed8c5";

/// Uuid of predefined config "Full and fast" (rid 1).
pub const CONFIG_UUID_FULL_AND_FAST: &str = "daba56c8-73ec-11df-a475-002264764cea";
/// Uuid of predefined config "Full and fast ultimate" (rid 2).
pub const CONFIG_UUID_FULL_AND_FAST_ULTIMATE: &str = "698f691e-7489-11df-9d8c-002264764cea";
/// Uuid of predefined config "Full and very deep" (rid 3).
pub const CONFIG_UUID_FULL_AND_VERY_DEEP: &str = "708f25c4-7489-11df-8094-002264764cea";
/// Uuid of predefined config "Full and very deep ultimate" (rid 4).
pub const CONFIG_UUID_FULL_AND_VERY_DEEP_ULTIMATE: &str =
    "74db13d6-7489-11df-91b9-002264764cea";
/// Uuid of the predefined "empty" config template (ordinary rid).
pub const CONFIG_UUID_EMPTY: &str = "085569ce-73ed-11df-83c3-002264764cea";

/// Uuid of the predefined "Localhost" target.
pub const TARGET_UUID_LOCALHOST: &str = "b493b7a8-7489-11df-a3ec-002264764cea";

/// Uuid of the predefined example task.
pub const TASK_UUID_EXAMPLE: &str = "343435d6-91b0-11de-9478-ffd71f4c6f29";
/// Uuid of the predefined example report.
pub const REPORT_UUID_EXAMPLE: &str = "343435d6-91b0-11de-9478-ffd71f4c6f30";

/// Uuid of the predefined "CPE" report format.
pub const FORMAT_UUID_CPE: &str = "a0704abb-2120-489f-959f-251c9f4ffebd";
/// Uuid of the predefined "HTML" report format.
pub const FORMAT_UUID_HTML: &str = "b993b6f5-f9fb-4e6e-9c94-dd46c00e058d";
/// Uuid of the predefined "ITG" report format.
pub const FORMAT_UUID_ITG: &str = "929884c6-c2c4-41e7-befb-2f6aa163b458";
/// Uuid of the predefined "LaTeX" report format.
pub const FORMAT_UUID_LATEX: &str = "9f1ab17b-3e29-4d9c-af3a-9a15e4dd5743";
/// Uuid of the predefined "NBE" report format.
pub const FORMAT_UUID_NBE: &str = "f5c2a364-47d2-4700-b21d-0a7693daddab";
/// Uuid of the predefined "PDF" report format.
pub const FORMAT_UUID_PDF: &str = "1a60a67e-97d0-4cbf-bc77-f71b08e7043d";
/// Uuid of the predefined "TXT" report format.
pub const FORMAT_UUID_TXT: &str = "19f6f1b3-7128-4433-888c-ccc764fe6ed5";
/// Uuid of the predefined "XML" report format.
pub const FORMAT_UUID_XML: &str = "d5da9f67-8551-4e51-807b-b6a873d70e34";

/// Fixed date stamped on the example report.
const EXAMPLE_REPORT_DATE: i64 = 1_251_236_905;

// ============================================================================
// SECTION: DDL
// ============================================================================

/// The complete schema at the supported version.
const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS meta (
    rid INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    value TEXT);
CREATE TABLE IF NOT EXISTS users (
    rid INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE NOT NULL,
    name TEXT NOT NULL,
    password TEXT);
CREATE TABLE IF NOT EXISTS tasks (
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
CREATE INDEX IF NOT EXISTS tasks_by_owner ON tasks (owner);
CREATE TABLE IF NOT EXISTS configs (
    rid INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE NOT NULL,
    owner INTEGER REFERENCES users (rid),
    name TEXT NOT NULL,
    nvt_selector TEXT NOT NULL,
    comment TEXT,
    family_count INTEGER NOT NULL DEFAULT 0,
    nvt_count INTEGER NOT NULL DEFAULT 0,
    families_growing INTEGER NOT NULL DEFAULT 0,
    nvts_growing INTEGER NOT NULL DEFAULT 0);
CREATE TABLE IF NOT EXISTS config_preferences (
    rid INTEGER PRIMARY KEY,
    config INTEGER NOT NULL,
    type TEXT,
    name TEXT NOT NULL,
    value TEXT);
CREATE TABLE IF NOT EXISTS nvt_selectors (
    rid INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    exclude INTEGER NOT NULL DEFAULT 0,
    type INTEGER NOT NULL,
    family_or_nvt TEXT,
    family TEXT);
CREATE INDEX IF NOT EXISTS nvt_selectors_by_name ON nvt_selectors (name);
CREATE TABLE IF NOT EXISTS nvts (
    rid INTEGER PRIMARY KEY,
    oid TEXT UNIQUE NOT NULL,
    version TEXT,
    name TEXT,
    summary TEXT,
    description TEXT,
    copyright TEXT,
    cve TEXT,
    bid TEXT,
    xref TEXT,
    tag TEXT,
    sign_key_ids TEXT,
    category INTEGER,
    family TEXT,
    cvss_base TEXT,
    risk_factor TEXT);
CREATE TABLE IF NOT EXISTS nvt_preferences (
    rid INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    value TEXT);
CREATE TABLE IF NOT EXISTS targets (
    rid INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE NOT NULL,
    owner INTEGER REFERENCES users (rid),
    name TEXT NOT NULL,
    hosts TEXT NOT NULL,
    comment TEXT,
    lsc_credential INTEGER NOT NULL DEFAULT 0,
    smb_lsc_credential INTEGER NOT NULL DEFAULT 0,
    port_range TEXT NOT NULL DEFAULT 'default');
CREATE TABLE IF NOT EXISTS lsc_credentials (
    rid INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE NOT NULL,
    owner INTEGER REFERENCES users (rid),
    name TEXT NOT NULL,
    login TEXT,
    password TEXT,
    comment TEXT,
    public_key TEXT,
    private_key TEXT,
    rpm BLOB,
    deb BLOB,
    exe BLOB);
CREATE TABLE IF NOT EXISTS agents (
    rid INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE NOT NULL,
    owner INTEGER REFERENCES users (rid),
    name TEXT NOT NULL,
    comment TEXT,
    installer BLOB,
    installer_64 TEXT,
    installer_filename TEXT,
    installer_signature_64 TEXT,
    installer_trust INTEGER NOT NULL DEFAULT 3,
    installer_trust_time INTEGER,
    howto_install TEXT,
    howto_use TEXT);
CREATE TABLE IF NOT EXISTS schedules (
    rid INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE NOT NULL,
    owner INTEGER REFERENCES users (rid),
    name TEXT NOT NULL,
    comment TEXT,
    first_time INTEGER NOT NULL,
    period INTEGER NOT NULL DEFAULT 0,
    period_months INTEGER NOT NULL DEFAULT 0,
    duration INTEGER NOT NULL DEFAULT 0);
CREATE TABLE IF NOT EXISTS slaves (
    rid INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE NOT NULL,
    owner INTEGER REFERENCES users (rid),
    name TEXT NOT NULL,
    comment TEXT,
    host TEXT,
    port INTEGER,
    login TEXT,
    password TEXT);
CREATE TABLE IF NOT EXISTS reports (
    rid INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE NOT NULL,
    owner INTEGER REFERENCES users (rid),
    hidden INTEGER NOT NULL DEFAULT 0,
    task INTEGER NOT NULL,
    date INTEGER,
    start_time INTEGER,
    end_time INTEGER,
    comment TEXT,
    scan_run_status INTEGER NOT NULL,
    slave_progress INTEGER NOT NULL DEFAULT 0,
    slave_task_uuid TEXT);
CREATE INDEX IF NOT EXISTS reports_by_task ON reports (task);
CREATE TABLE IF NOT EXISTS report_hosts (
    rid INTEGER PRIMARY KEY,
    report INTEGER NOT NULL,
    host TEXT,
    start_time INTEGER,
    end_time INTEGER,
    current_port INTEGER,
    max_port INTEGER);
CREATE TABLE IF NOT EXISTS results (
    rid INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE NOT NULL,
    task INTEGER NOT NULL,
    subnet TEXT,
    host TEXT,
    port TEXT,
    nvt TEXT,
    type TEXT,
    description TEXT);
CREATE INDEX IF NOT EXISTS results_by_task ON results (task);
CREATE TABLE IF NOT EXISTS report_results (
    rid INTEGER PRIMARY KEY,
    report INTEGER NOT NULL,
    result INTEGER NOT NULL);
CREATE INDEX IF NOT EXISTS report_results_by_report ON report_results (report);
CREATE TABLE IF NOT EXISTS notes (
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
    task INTEGER NOT NULL DEFAULT 0,
    result INTEGER NOT NULL DEFAULT 0);
CREATE INDEX IF NOT EXISTS notes_by_nvt ON notes (nvt);
CREATE TABLE IF NOT EXISTS overrides (
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
    result INTEGER NOT NULL DEFAULT 0);
CREATE INDEX IF NOT EXISTS overrides_by_nvt ON overrides (nvt);
CREATE TABLE IF NOT EXISTS escalators (
    rid INTEGER PRIMARY KEY,
    uuid TEXT UNIQUE NOT NULL,
    owner INTEGER REFERENCES users (rid),
    name TEXT NOT NULL,
    comment TEXT,
    event INTEGER NOT NULL,
    condition INTEGER NOT NULL,
    method INTEGER NOT NULL);
CREATE TABLE IF NOT EXISTS escalator_condition_data (
    rid INTEGER PRIMARY KEY,
    escalator INTEGER NOT NULL,
    name TEXT,
    data TEXT);
CREATE TABLE IF NOT EXISTS escalator_event_data (
    rid INTEGER PRIMARY KEY,
    escalator INTEGER NOT NULL,
    name TEXT,
    data TEXT);
CREATE TABLE IF NOT EXISTS escalator_method_data (
    rid INTEGER PRIMARY KEY,
    escalator INTEGER NOT NULL,
    name TEXT,
    data TEXT);
CREATE TABLE IF NOT EXISTS task_escalators (
    rid INTEGER PRIMARY KEY,
    task INTEGER NOT NULL,
    escalator INTEGER NOT NULL);
CREATE TABLE IF NOT EXISTS report_formats (
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
CREATE TABLE IF NOT EXISTS report_format_params (
    rid INTEGER PRIMARY KEY,
    report_format INTEGER NOT NULL,
    name TEXT NOT NULL,
    type INTEGER NOT NULL,
    value TEXT,
    default_value TEXT,
    min_value INTEGER,
    max_value INTEGER);
CREATE TABLE IF NOT EXISTS report_format_param_options (
    rid INTEGER PRIMARY KEY,
    report_format_param INTEGER NOT NULL,
    value TEXT);
";

// ============================================================================
// SECTION: Initialization
// ============================================================================

/// Creates the schema and seeds predefined rows. Idempotent: existing
/// tables and seed rows are left alone. A store whose recorded version is
/// older than the supported version is not touched here; that path goes
/// through [`crate::migrate::migrate`].
///
/// # Errors
///
/// Returns [`StoreError`] on any statement failure.
pub fn initialize(store: &mut Store) -> Result<(), StoreError> {
    store.exclusive(|tx| {
        tx.exec_batch(SCHEMA)?;
        let version: Option<i64> = tx
            .opt_string("SELECT value FROM meta WHERE name = 'database_version'", [])?
            .and_then(|value| value.parse().ok());
        if version.is_none() {
            tx.exec(
                "INSERT INTO meta (name, value) VALUES ('database_version', ?1)",
                params![SUPPORTED_VERSION.to_string()],
            )?;
        }
        seed_user_om(tx)?;
        seed_selectors(tx)?;
        seed_configs(tx)?;
        seed_target_localhost(tx)?;
        seed_example_task(tx)?;
        seed_report_formats(tx)?;
        Ok(())
    })
}

/// Seeds the predefined `om` user.
fn seed_user_om(tx: &Tx<'_>) -> Result<(), StoreError> {
    tx.exec(
        "INSERT INTO users (uuid, name, password)
         SELECT make_uuid(), 'om', NULL
         WHERE NOT EXISTS (SELECT 1 FROM users WHERE name = 'om')",
        [],
    )?;
    Ok(())
}

/// Seeds the predefined "all" selector.
fn seed_selectors(tx: &Tx<'_>) -> Result<(), StoreError> {
    tx.exec(
        "INSERT INTO nvt_selectors (name, exclude, type, family_or_nvt, family)
         SELECT ?1, 0, 0, NULL, NULL
         WHERE NOT EXISTS (SELECT 1 FROM nvt_selectors WHERE name = ?1)",
        params![SELECTOR_UUID_ALL],
    )?;
    Ok(())
}

/// Seeds the four fixed-rid configs and the "empty" template.
fn seed_configs(tx: &Tx<'_>) -> Result<(), StoreError> {
    let fixed: [(i64, &str, &str, &str); 4] = [
        (
            1,
            CONFIG_UUID_FULL_AND_FAST,
            "Full and fast",
            "All NVTs; optimized by using previously collected information.",
        ),
        (
            2,
            CONFIG_UUID_FULL_AND_FAST_ULTIMATE,
            "Full and fast ultimate",
            "All NVTs including those that can stop services or hosts; \
             optimized by using previously collected information.",
        ),
        (
            3,
            CONFIG_UUID_FULL_AND_VERY_DEEP,
            "Full and very deep",
            "All NVTs; don't trust previously collected information; slow.",
        ),
        (
            4,
            CONFIG_UUID_FULL_AND_VERY_DEEP_ULTIMATE,
            "Full and very deep ultimate",
            "All NVTs including those that can stop services or hosts; \
             don't trust previously collected information; slow.",
        ),
    ];
    for (rid, uuid, name, comment) in fixed {
        tx.exec(
            "INSERT INTO configs (rid, uuid, owner, name, nvt_selector, comment,
                                  family_count, nvt_count, families_growing, nvts_growing)
             SELECT ?1, ?2, NULL, ?3, ?4, ?5, 0, 0, 1, 1
             WHERE NOT EXISTS (SELECT 1 FROM configs WHERE uuid = ?2)",
            params![rid, uuid, name, SELECTOR_UUID_ALL, comment],
        )?;
    }
    // The ultimate variants disable safe checks on the scanner side.
    for config_rid in [2_i64, 4] {
        tx.exec(
            "INSERT INTO config_preferences (config, type, name, value)
             SELECT ?1, 'SERVER_PREFS', 'safe_checks', 'no'
             WHERE NOT EXISTS (SELECT 1 FROM config_preferences
                               WHERE config = ?1 AND name = 'safe_checks')",
            params![config_rid],
        )?;
    }
    tx.exec(
        "INSERT INTO configs (uuid, owner, name, nvt_selector, comment,
                              family_count, nvt_count, families_growing, nvts_growing)
         SELECT ?1, NULL, 'empty', ?1, 'Empty and static configuration template.',
                0, 0, 0, 0
         WHERE NOT EXISTS (SELECT 1 FROM configs WHERE uuid = ?1)",
        params![CONFIG_UUID_EMPTY],
    )?;
    Ok(())
}

/// Seeds the predefined "Localhost" target.
fn seed_target_localhost(tx: &Tx<'_>) -> Result<(), StoreError> {
    tx.exec(
        "INSERT INTO targets (uuid, owner, name, hosts, comment, port_range)
         SELECT ?1, NULL, 'Localhost', 'localhost', '', 'default'
         WHERE NOT EXISTS (SELECT 1 FROM targets WHERE uuid = ?1)",
        params![TARGET_UUID_LOCALHOST],
    )?;
    Ok(())
}

/// Seeds the hidden example task with its finished example report.
fn seed_example_task(tx: &Tx<'_>) -> Result<(), StoreError> {
    let existing =
        tx.opt_i64("SELECT rid FROM tasks WHERE uuid = ?1", params![TASK_UUID_EXAMPLE])?;
    if existing.is_some() {
        return Ok(());
    }
    tx.exec(
        "INSERT INTO tasks (uuid, owner, name, hidden, comment, description,
                            run_status, config, target)
         VALUES (?1, NULL, 'Example task', 1, 'This is an example task.', '', ?2, 0, 0)",
        params![TASK_UUID_EXAMPLE, 1_i64],
    )?;
    let task_rid = tx.last_insert_rid();
    tx.exec(
        "INSERT INTO reports (uuid, owner, hidden, task, date, start_time, end_time,
                              comment, scan_run_status)
         VALUES (?1, NULL, 1, ?2, ?3, ?3, ?3, '', ?4)",
        params![REPORT_UUID_EXAMPLE, task_rid, EXAMPLE_REPORT_DATE, 1_i64],
    )?;
    let report_rid = tx.last_insert_rid();
    tx.exec(
        "INSERT INTO report_hosts (report, host, start_time, end_time)
         VALUES (?1, 'localhost', ?2, ?2)",
        params![report_rid, EXAMPLE_REPORT_DATE],
    )?;
    tx.exec(
        "INSERT INTO results (uuid, task, subnet, host, port, nvt, type, description)
         VALUES (make_uuid(), ?1, '', 'localhost', 'telnet (23/tcp)',
                 '1.3.6.1.4.1.25623.1.0.10330', 'Security Note',
                 'A telnet server seems to be running on this port.')",
        params![task_rid],
    )?;
    let result_rid = tx.last_insert_rid();
    tx.exec(
        "INSERT INTO report_results (report, result) VALUES (?1, ?2)",
        params![report_rid, result_rid],
    )?;
    Ok(())
}

/// Seeds the eight predefined report formats, trusted and active. Shared
/// with the v20 migration step, which introduced the tables.
pub(crate) fn seed_report_formats(tx: &Tx<'_>) -> Result<(), StoreError> {
    let formats: [(&str, &str, &str, &str, &str); 8] = [
        (
            FORMAT_UUID_CPE,
            "CPE",
            "csv",
            "text/csv",
            "Common Product Enumeration CSV table.",
        ),
        (FORMAT_UUID_HTML, "HTML", "html", "text/html", "Single page HTML report."),
        (
            FORMAT_UUID_ITG,
            "ITG",
            "csv",
            "text/csv",
            "German \"IT-Grundschutz\" catalogue table.",
        ),
        (
            FORMAT_UUID_LATEX,
            "LaTeX",
            "tex",
            "text/plain",
            "LaTeX source for the PDF report.",
        ),
        (FORMAT_UUID_NBE, "NBE", "nbe", "text/plain", "Legacy OpenVAS NBE report."),
        (FORMAT_UUID_PDF, "PDF", "pdf", "application/pdf", "Portable Document Format report."),
        (FORMAT_UUID_TXT, "TXT", "txt", "text/plain", "Plain text report."),
        (FORMAT_UUID_XML, "XML", "xml", "text/xml", "Raw XML report."),
    ];
    for (uuid, name, extension, content_type, summary) in formats {
        tx.exec(
            "INSERT INTO report_formats (uuid, owner, name, extension, content_type,
                                         summary, description, signature, trust,
                                         trust_time, flags)
             SELECT ?1, NULL, ?2, ?3, ?4, ?5, ?5, NULL, 1, 0, 1
             WHERE NOT EXISTS (SELECT 1 FROM report_formats WHERE uuid = ?1)",
            params![uuid, name, extension, content_type, summary],
        )?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
