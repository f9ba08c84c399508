// crates/scan-manager-entities/src/reports.rs
// ============================================================================
// Module: Report and Result Repositories
// Description: Per-run report containers, scanner results, and the
//              filtered/sorted result query behind report rendering.
// Purpose: Maintain report rows through a scan and answer the override-
//          aware queries the report pipeline consumes.
// Dependencies: crate::{access, context, outcome, overrides}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! A report is one run of a task: its results arrive through the scanner
//! feed path while the scan runs, host rows track per-host progress, and
//! the run status mirrors the task lifecycle. Reports delete only in
//! terminal states, taking their links, host rows, and results along in
//! one transaction. The filtered result query applies the override
//! resolver per row when requested, then levels, CVSS floor, and search
//! phrase, then pagination.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::EntityUuid;
use scan_manager_core::MessageType;
use scan_manager_core::RunStatus;
use scan_manager_store::StoreError;

use crate::access::visible_rid_by_uuid;
use crate::context::EntityError;
use crate::context::Manage;
use crate::outcome::DeleteOutcome;
use crate::overrides::effective_type;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One report row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for the predefined example report.
    pub owner: Option<i64>,
    /// Hidden flag; the example report is hidden.
    pub hidden: bool,
    /// Owning task rid.
    pub task: i64,
    /// Creation date, unix seconds.
    pub date: i64,
    /// Scan start, unix seconds; 0 before the scanner acknowledged.
    pub start_time: i64,
    /// Scan end, unix seconds; 0 while running.
    pub end_time: i64,
    /// Free-form comment.
    pub comment: String,
    /// Run status mirrored from the task lifecycle.
    pub scan_run_status: RunStatus,
    /// Progress percentage reported by a slave, when delegated.
    pub slave_progress: i64,
    /// Task uuid on the slave, when delegated.
    pub slave_task_uuid: String,
}

/// One host row of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHost {
    /// Host the scanner attacked.
    pub host: String,
    /// When the host scan started.
    pub start_time: i64,
    /// When the host scan ended; 0 while running.
    pub end_time: i64,
}

/// One scanner result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewResult {
    /// Subnet the host belongs to.
    pub subnet: String,
    /// Host the finding concerns.
    pub host: String,
    /// Port description, e.g. `telnet (23/tcp)`.
    pub port: String,
    /// OID of the reporting NVT.
    pub nvt: String,
    /// Raw severity label.
    pub result_type: String,
    /// Finding text.
    pub description: String,
}

/// One result prepared for rendering: raw row plus resolved severity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResult {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Subnet the host belongs to.
    pub subnet: String,
    /// Host the finding concerns.
    pub host: String,
    /// Port description.
    pub port: String,
    /// OID of the reporting NVT.
    pub nvt_oid: String,
    /// Raw severity label.
    pub raw_type: String,
    /// Effective severity after overrides (equals raw when not applied).
    pub threat: String,
    /// Finding text.
    pub description: String,
}

/// Per-severity counts of one report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCounts {
    /// "Security Hole" results.
    pub holes: i64,
    /// "Security Warning" results.
    pub warnings: i64,
    /// "Security Note" results.
    pub infos: i64,
    /// "Log Message" results.
    pub logs: i64,
    /// "Debug Message" results.
    pub debugs: i64,
    /// "False Positive" results.
    pub false_positives: i64,
}

impl ReportCounts {
    /// Total counted results.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.holes + self.warnings + self.infos + self.logs + self.debugs
            + self.false_positives
    }
}

// ============================================================================
// SECTION: Result Filters
// ============================================================================

/// Sort field for rendered results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    /// Sort by port, host second.
    #[default]
    Port,
    /// Sort by severity, port second.
    Type,
}

/// Filter set for the rendered result query.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFilters {
    /// Ascending sort when true.
    pub sort_ascending: bool,
    /// Field to sort on.
    pub sort_field: SortField,
    /// Severity level characters from `hmlgdf`; empty selects every level.
    pub levels: String,
    /// Apply the override resolver per result.
    pub apply_overrides: bool,
    /// Minimum CVSS base score; results without a score always pass.
    pub min_cvss_base: Option<f64>,
    /// Case-insensitive substring over host, port, OID, and description.
    pub search_phrase: String,
    /// Zero-based index of the first result after filtering.
    pub first_result: usize,
    /// Maximum results returned; `None` for all.
    pub max_results: Option<usize>,
}

impl Default for ResultFilters {
    fn default() -> Self {
        Self {
            sort_ascending: true,
            sort_field: SortField::Port,
            levels: String::new(),
            apply_overrides: false,
            min_cvss_base: None,
            search_phrase: String::new(),
            first_result: 0,
            max_results: None,
        }
    }
}

/// Level character for a severity label, per the `hmlgdf` filter alphabet.
const fn level_char(message_type: MessageType) -> char {
    match message_type {
        MessageType::SecurityHole => 'h',
        MessageType::SecurityWarning => 'm',
        MessageType::SecurityNote => 'l',
        MessageType::LogMessage => 'g',
        MessageType::DebugMessage => 'd',
        MessageType::FalsePositive => 'f',
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl Manage {
    /// Finds a visible report by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_report_by_uuid(&mut self, uuid: &str) -> Result<Option<Report>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "reports", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT rid, uuid, owner, hidden, task, date, start_time, end_time,
                        comment, scan_run_status, slave_progress, slave_task_uuid
                 FROM reports WHERE rid = ?1",
                params![rid],
                report_from_row,
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Iterates a task's non-hidden reports, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn task_reports(&mut self, task_rid: i64) -> Result<Vec<Report>, EntityError> {
        Ok(self.store().immediate(|tx| {
            tx.rows(
                "SELECT rid, uuid, owner, hidden, task, date, start_time, end_time,
                        comment, scan_run_status, slave_progress, slave_task_uuid
                 FROM reports WHERE task = ?1 AND hidden = 0 ORDER BY date DESC",
                params![task_rid],
                report_from_row,
            )
        })?)
    }

    /// Appends a scanner result to a report and its task.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn add_report_result(
        &mut self,
        report_rid: i64,
        new: &NewResult,
    ) -> Result<EntityUuid, EntityError> {
        let uuid = EntityUuid::generate();
        self.store().exclusive(|tx| {
            let task_rid =
                tx.scalar_i64("SELECT task FROM reports WHERE rid = ?1", params![report_rid])?;
            tx.exec(
                "INSERT INTO results (uuid, task, subnet, host, port, nvt, type,
                                      description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    uuid.as_str(),
                    task_rid,
                    new.subnet,
                    new.host,
                    new.port,
                    new.nvt,
                    new.result_type,
                    new.description
                ],
            )?;
            let result_rid = tx.last_insert_rid();
            tx.exec(
                "INSERT INTO report_results (report, result) VALUES (?1, ?2)",
                params![report_rid, result_rid],
            )?;
            Ok::<_, EntityError>(uuid)
        })
    }

    /// Records the scanner starting on one host of a report.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn set_report_host_start(
        &mut self,
        report_rid: i64,
        host: &str,
        time: i64,
    ) -> Result<(), EntityError> {
        self.store().exclusive(|tx| {
            tx.exec(
                "INSERT INTO report_hosts (report, host, start_time, end_time)
                 VALUES (?1, ?2, ?3, 0)",
                params![report_rid, host, time],
            )?;
            Ok::<_, EntityError>(())
        })
    }

    /// Records the scanner finishing one host of a report.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn set_report_host_end(
        &mut self,
        report_rid: i64,
        host: &str,
        time: i64,
    ) -> Result<(), EntityError> {
        self.store().exclusive(|tx| {
            tx.exec(
                "UPDATE report_hosts SET end_time = ?1 WHERE report = ?2 AND host = ?3",
                params![time, report_rid, host],
            )?;
            Ok::<_, EntityError>(())
        })
    }

    /// Host rows of a report. With `with_results_only`, hosts without any
    /// result are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn report_hosts(
        &mut self,
        report_rid: i64,
        with_results_only: bool,
    ) -> Result<Vec<ReportHost>, EntityError> {
        Ok(self.store().immediate(|tx| {
            let sql = if with_results_only {
                "SELECT host, start_time, end_time FROM report_hosts
                 WHERE report = ?1
                   AND EXISTS (SELECT 1 FROM results, report_results
                               WHERE report_results.report = ?1
                                 AND report_results.result = results.rid
                                 AND results.host = report_hosts.host)
                 ORDER BY host COLLATE collate_ip"
            } else {
                "SELECT host, start_time, end_time FROM report_hosts
                 WHERE report = ?1 ORDER BY host COLLATE collate_ip"
            };
            tx.rows(sql, params![report_rid], |row| {
                Ok(ReportHost {
                    host: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    start_time: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                    end_time: row.get::<_, Option<i64>>(2)?.unwrap_or_default(),
                })
            })
        })?)
    }

    /// Updates delegation progress on a report.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn set_report_slave_progress(
        &mut self,
        report_rid: i64,
        progress: i64,
        slave_task_uuid: &str,
    ) -> Result<(), EntityError> {
        self.store().exclusive(|tx| {
            tx.exec(
                "UPDATE reports SET slave_progress = ?1, slave_task_uuid = ?2 WHERE rid = ?3",
                params![progress, slave_task_uuid, report_rid],
            )?;
            Ok::<_, EntityError>(())
        })
    }

    /// Per-severity counts of a report, raw or override-adjusted.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn report_counts(
        &mut self,
        report_rid: i64,
        apply_overrides: bool,
    ) -> Result<ReportCounts, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let rows = fetch_result_rows(tx, report_rid)?;
            let mut counts = ReportCounts::default();
            for row in rows {
                let label = if apply_overrides {
                    effective_type(
                        tx,
                        user_rid,
                        row.task,
                        row.rid,
                        &row.nvt_oid,
                        &row.host,
                        &row.port,
                        &row.raw_type,
                    )?
                } else {
                    row.raw_type.clone()
                };
                match MessageType::parse(&label) {
                    Some(MessageType::SecurityHole) => counts.holes += 1,
                    Some(MessageType::SecurityWarning) => counts.warnings += 1,
                    Some(MessageType::SecurityNote) => counts.infos += 1,
                    Some(MessageType::LogMessage) => counts.logs += 1,
                    Some(MessageType::DebugMessage) => counts.debugs += 1,
                    Some(MessageType::FalsePositive) => counts.false_positives += 1,
                    None => {}
                }
            }
            Ok::<_, StoreError>(counts)
        })?)
    }

    /// The filtered, sorted, override-resolved results of a report, with
    /// the count of results that survived filtering before pagination.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn report_rendered_results(
        &mut self,
        report_rid: i64,
        filters: &ResultFilters,
    ) -> Result<(Vec<RenderedResult>, usize), EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let mut rows = fetch_result_rows(tx, report_rid)?;
            sort_rows(&mut rows, filters);
            let phrase = filters.search_phrase.to_lowercase();
            let mut rendered = Vec::new();
            for row in rows {
                let threat = if filters.apply_overrides {
                    effective_type(
                        tx,
                        user_rid,
                        row.task,
                        row.rid,
                        &row.nvt_oid,
                        &row.host,
                        &row.port,
                        &row.raw_type,
                    )?
                } else {
                    row.raw_type.clone()
                };
                if !level_selected(&filters.levels, &threat) {
                    continue;
                }
                if let Some(floor) = filters.min_cvss_base {
                    if row.cvss_base.parse::<f64>().is_ok_and(|score| score < floor) {
                        continue;
                    }
                }
                if !phrase.is_empty() && !matches_phrase(&row, &phrase) {
                    continue;
                }
                rendered.push(RenderedResult {
                    rid: row.rid,
                    uuid: EntityUuid::from_stored(row.uuid),
                    subnet: row.subnet,
                    host: row.host,
                    port: row.port,
                    nvt_oid: row.nvt_oid,
                    raw_type: row.raw_type,
                    threat,
                    description: row.description,
                });
            }
            let filtered_total = rendered.len();
            let page: Vec<RenderedResult> = rendered
                .into_iter()
                .skip(filters.first_result)
                .take(filters.max_results.unwrap_or(usize::MAX))
                .collect();
            Ok::<_, StoreError>((page, filtered_total))
        })?)
    }

    /// Deletes a report in a terminal state, with its links, host rows,
    /// and results, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_report(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "reports", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            let status_code = tx
                .scalar_i64("SELECT scan_run_status FROM reports WHERE rid = ?1", params![rid])?;
            let terminal = matches!(
                RunStatus::from_code(status_code),
                Some(RunStatus::Done | RunStatus::Stopped | RunStatus::InternalError)
            );
            if !terminal {
                return Ok(DeleteOutcome::InUse);
            }
            tx.exec(
                "DELETE FROM results
                 WHERE rid IN (SELECT result FROM report_results WHERE report = ?1)",
                params![rid],
            )?;
            tx.exec("DELETE FROM report_results WHERE report = ?1", params![rid])?;
            tx.exec("DELETE FROM report_hosts WHERE report = ?1", params![rid])?;
            tx.exec("DELETE FROM reports WHERE rid = ?1", params![rid])?;
            Ok::<_, EntityError>(DeleteOutcome::Deleted)
        })
    }
}

// ============================================================================
// SECTION: Internals
// ============================================================================

/// Raw result row joined with its NVT's CVSS base.
struct RawResultRow {
    /// Row id.
    rid: i64,
    /// Stable identifier.
    uuid: String,
    /// Owning task rid.
    task: i64,
    /// Subnet column.
    subnet: String,
    /// Host column.
    host: String,
    /// Port column.
    port: String,
    /// NVT OID column.
    nvt_oid: String,
    /// Raw severity label.
    raw_type: String,
    /// Finding text.
    description: String,
    /// CVSS base of the reporting NVT, empty when unknown.
    cvss_base: String,
}

/// Fetches every result of a report with its CVSS base.
fn fetch_result_rows(
    tx: &scan_manager_store::Tx<'_>,
    report_rid: i64,
) -> Result<Vec<RawResultRow>, StoreError> {
    tx.rows(
        "SELECT results.rid, results.uuid, results.task, results.subnet, results.host,
                results.port, results.nvt, results.type, results.description,
                coalesce(nvts.cvss_base, '')
         FROM results
         JOIN report_results ON report_results.result = results.rid
         LEFT JOIN nvts ON nvts.oid = results.nvt
         WHERE report_results.report = ?1",
        params![report_rid],
        |row| {
            Ok(RawResultRow {
                rid: row.get(0)?,
                uuid: row.get(1)?,
                task: row.get(2)?,
                subnet: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                host: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                port: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                nvt_oid: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                raw_type: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                description: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                cvss_base: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            })
        },
    )
}

/// Sorts raw rows per the filter's field and direction.
fn sort_rows(rows: &mut [RawResultRow], filters: &ResultFilters) {
    match filters.sort_field {
        SortField::Port => {
            rows.sort_by(|a, b| a.port.cmp(&b.port).then_with(|| a.host.cmp(&b.host)));
        }
        SortField::Type => {
            rows.sort_by(|a, b| {
                MessageType::collate(&a.raw_type, &b.raw_type)
                    .then_with(|| a.port.cmp(&b.port))
            });
        }
    }
    if !filters.sort_ascending {
        rows.reverse();
    }
}

/// Whether a severity label passes the `hmlgdf` level filter.
fn level_selected(levels: &str, label: &str) -> bool {
    if levels.is_empty() {
        return true;
    }
    MessageType::parse(label).is_some_and(|message_type| levels.contains(level_char(message_type)))
}

/// Case-insensitive phrase match over the searchable columns.
fn matches_phrase(row: &RawResultRow, phrase: &str) -> bool {
    row.host.to_lowercase().contains(phrase)
        || row.port.to_lowercase().contains(phrase)
        || row.nvt_oid.to_lowercase().contains(phrase)
        || row.description.to_lowercase().contains(phrase)
}

/// Maps one row of the standard report projection.
fn report_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    Ok(Report {
        rid: row.get(0)?,
        uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
        owner: row.get(2)?,
        hidden: row.get::<_, i64>(3)? != 0,
        task: row.get(4)?,
        date: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
        start_time: row.get::<_, Option<i64>>(6)?.unwrap_or_default(),
        end_time: row.get::<_, Option<i64>>(7)?.unwrap_or_default(),
        comment: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        scan_run_status: RunStatus::from_code(row.get(9)?)
            .unwrap_or(RunStatus::InternalError),
        slave_progress: row.get::<_, Option<i64>>(10)?.unwrap_or_default(),
        slave_task_uuid: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use scan_manager_core::RunStatus;
    use scan_manager_core::ThreatLevel;

    use super::NewResult;
    use super::ResultFilters;
    use super::SortField;
    use crate::outcome::CreateOutcome;
    use crate::outcome::DeleteOutcome;
    use crate::overrides::NewOverride;
    use crate::tasks::NewTask;
    use crate::tasks::StartOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    /// Creates a task, requests it, and returns (task_rid, report_rid).
    fn running_report(manage: &mut crate::context::Manage) -> (i64, i64) {
        let CreateOutcome::Created(task_uuid) = manage
            .create_task(&NewTask {
                name: "report owner".to_string(),
                config: "daba56c8-73ec-11df-a475-002264764cea".to_string(),
                target: "b493b7a8-7489-11df-a3ec-002264764cea".to_string(),
                ..NewTask::default()
            })
            .unwrap()
        else {
            panic!("expected task create");
        };
        let StartOutcome::Requested { event, .. } =
            manage.set_task_requested(task_uuid.as_str()).unwrap()
        else {
            panic!("expected requested");
        };
        let task_rid = event.task_rid;
        let report_rid = manage
            .store()
            .immediate(|tx| {
                tx.scalar_i64(
                    "SELECT rid FROM reports WHERE task = ?1",
                    rusqlite::params![task_rid],
                )
            })
            .unwrap();
        manage.set_task_run_status(task_rid, RunStatus::Running).unwrap();
        (task_rid, report_rid)
    }

    fn warning(host: &str, port: &str) -> NewResult {
        NewResult {
            host: host.to_string(),
            port: port.to_string(),
            nvt: "OID-A".to_string(),
            result_type: "Security Warning".to_string(),
            description: "weak banner".to_string(),
            ..NewResult::default()
        }
    }

    #[test]
    fn counts_shift_when_an_override_applies() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let (task_rid, report_rid) = running_report(&mut manage);
        manage.add_report_result(report_rid, &warning("192.168.1.10", "80/tcp")).unwrap();
        manage.add_report_result(report_rid, &warning("192.168.1.11", "80/tcp")).unwrap();
        let raw = manage.report_counts(report_rid, false).unwrap();
        assert_eq!((raw.warnings, raw.false_positives), (2, 0));
        manage
            .create_override(&NewOverride {
                nvt: "OID-A".to_string(),
                hosts: "192.168.1.10".to_string(),
                port: "80/tcp".to_string(),
                threat: "Security Warning".to_string(),
                new_threat: "False Positive".to_string(),
                ..NewOverride::default()
            })
            .unwrap();
        let adjusted = manage.report_counts(report_rid, true).unwrap();
        assert_eq!((adjusted.warnings, adjusted.false_positives), (1, 1));
        // Raw counts are untouched by the override.
        let raw_again = manage.report_counts(report_rid, false).unwrap();
        assert_eq!((raw_again.warnings, raw_again.false_positives), (2, 0));
        // The task aggregates through the override too.
        manage.set_task_run_status(task_rid, RunStatus::Done).unwrap();
        assert_eq!(
            manage.task_threat_level(task_rid, true).unwrap(),
            Some(ThreatLevel::Medium)
        );
    }

    #[test]
    fn level_filter_and_pagination_compose() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let (_task, report_rid) = running_report(&mut manage);
        for index in 0 .. 4 {
            manage
                .add_report_result(report_rid, &warning("10.0.0.1", &format!("{index}/tcp")))
                .unwrap();
        }
        let mut log = warning("10.0.0.1", "99/tcp");
        log.result_type = "Log Message".to_string();
        manage.add_report_result(report_rid, &log).unwrap();
        let filters = ResultFilters {
            levels: "m".to_string(),
            first_result: 1,
            max_results: Some(2),
            ..ResultFilters::default()
        };
        let (page, filtered_total) =
            manage.report_rendered_results(report_rid, &filters).unwrap();
        assert_eq!(filtered_total, 4);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].port, "1/tcp");
    }

    #[test]
    fn severity_sort_puts_holes_first() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let (_task, report_rid) = running_report(&mut manage);
        let mut hole = warning("10.0.0.1", "443/tcp");
        hole.result_type = "Security Hole".to_string();
        manage.add_report_result(report_rid, &warning("10.0.0.1", "80/tcp")).unwrap();
        manage.add_report_result(report_rid, &hole).unwrap();
        let filters = ResultFilters {
            sort_field: SortField::Type,
            ..ResultFilters::default()
        };
        let (page, _) = manage.report_rendered_results(report_rid, &filters).unwrap();
        assert_eq!(page[0].raw_type, "Security Hole");
    }

    #[test]
    fn running_reports_refuse_deletion() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let (task_rid, report_rid) = running_report(&mut manage);
        let report_uuid = manage
            .store()
            .immediate(|tx| {
                tx.scalar_string(
                    "SELECT uuid FROM reports WHERE rid = ?1",
                    rusqlite::params![report_rid],
                )
            })
            .unwrap();
        assert_eq!(manage.delete_report(&report_uuid).unwrap(), DeleteOutcome::InUse);
        manage.set_task_run_status(task_rid, RunStatus::Stopped).unwrap();
        assert_eq!(manage.delete_report(&report_uuid).unwrap(), DeleteOutcome::Deleted);
    }

    #[test]
    fn host_rows_track_start_and_end() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let (_task, report_rid) = running_report(&mut manage);
        manage.set_report_host_start(report_rid, "10.0.0.2", 1_000).unwrap();
        manage.set_report_host_end(report_rid, "10.0.0.2", 1_060).unwrap();
        let hosts = manage.report_hosts(report_rid, false).unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].end_time, 1_060);
        // No results on that host: result_hosts_only drops it.
        assert!(manage.report_hosts(report_rid, true).unwrap().is_empty());
    }
}
