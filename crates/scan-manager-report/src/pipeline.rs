// crates/scan-manager-report/src/pipeline.rs
// ============================================================================
// Module: Report Pipeline
// Description: Canonical XML build, format filter spawn, and delivery.
// Purpose: Materialize a filtered, sorted, overridden view of a report and
//          turn it into a final artifact through an external filter.
// Dependencies: crate::xml, base64, scan-manager-core,
//               scan-manager-entities, scan-manager-escalate, tempfile
// ============================================================================

//! ## Overview
//! Stage 1 writes the canonical XML document into a fresh per-invocation
//! temp directory. Stage 2 locates the format's directory (owner-scoped
//! first, then global), requires an executable `generate`, and runs it
//! with the XML path as sole argument and the format directory as working
//! directory; stdout is the artifact, stderr is discarded. Stage 3 hands
//! the artifact back whole or in 192 KiB chunks (base64 of the same chunk
//! when requested). The temp directory dies with the artifact handle.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use scan_manager_core::EntityUuid;
use scan_manager_core::ExecError;
use scan_manager_core::ToolCommand;
use scan_manager_core::ToolExit;
use scan_manager_entities::EntityError;
use scan_manager_entities::Manage;
use scan_manager_entities::reports::Report;
use scan_manager_entities::reports::ResultFilters;
use scan_manager_entities::reports::SortField;
use scan_manager_escalate::NoticeRenderer;
use tempfile::TempDir;
use thiserror::Error;
use tracing::warn;

use crate::xml::XmlWriter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Chunk size for streamed delivery, raw bytes per chunk.
pub const STREAM_CHUNK: usize = 192 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pipeline failure.
#[derive(Debug, Error)]
pub enum RenderError {
    /// No visible report with the given uuid.
    #[error("report {0} not found")]
    MissingReport(String),
    /// No visible report format with the given uuid.
    #[error("report format {0} not found")]
    MissingFormat(String),
    /// The format exists but is not active.
    #[error("report format {0} is not active")]
    InactiveFormat(String),
    /// The format directory has no executable `generate`.
    #[error("no executable generate filter under {0}")]
    MissingFilter(PathBuf),
    /// The filter ran and failed.
    #[error("generate filter failed with {0:?}")]
    FilterFailed(ToolExit),
    /// The filter could not be run.
    #[error(transparent)]
    Exec(#[from] ExecError),
    /// Underlying repository failure.
    #[error(transparent)]
    Entity(#[from] EntityError),
    /// Temp files could not be managed.
    #[error("report pipeline io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Filters
// ============================================================================

/// Full filter set of a render request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilters {
    /// Result-level filters: sort, levels, overrides, CVSS floor, phrase,
    /// pagination.
    pub results: ResultFilters,
    /// Drop hosts without any result from the host sections.
    pub result_hosts_only: bool,
    /// Include applicable notes under each result.
    pub include_notes: bool,
    /// Include note texts rather than bare counts.
    pub notes_details: bool,
    /// Include applicable overrides under each result.
    pub include_overrides: bool,
    /// Include override texts rather than bare counts.
    pub overrides_details: bool,
}

/// Level filter token string for the `<filters>` element.
fn filter_token(filters: &ReportFilters) -> String {
    if filters.results.levels.is_empty() {
        "hmlgdf".to_string()
    } else {
        filters.results.levels.clone()
    }
}

// ============================================================================
// SECTION: Artifact
// ============================================================================

/// A finished artifact bound to its temp directory. Dropping the value
/// removes the directory and everything in it.
#[derive(Debug)]
pub struct RenderedArtifact {
    /// Per-invocation temp directory holding the XML and the artifact.
    _dir: TempDir,
    /// Path of the artifact file.
    path: PathBuf,
    /// Content type declared by the format row.
    pub content_type: String,
    /// Filename extension declared by the format row.
    pub extension: String,
}

impl RenderedArtifact {
    /// Reads the whole artifact.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Io`] when the artifact cannot be read.
    pub fn bytes(&self) -> Result<Vec<u8>, RenderError> {
        fs::read(&self.path).map_err(|err| RenderError::Io(err.to_string()))
    }

    /// Streams the artifact through `sink` in fixed-size chunks, base64
    /// encoding each chunk when requested.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Io`] on read failure or when the sink
    /// reports one.
    pub fn stream(
        &self,
        encode_base64: bool,
        sink: &mut dyn FnMut(&[u8]) -> Result<(), String>,
    ) -> Result<(), RenderError> {
        let mut file =
            fs::File::open(&self.path).map_err(|err| RenderError::Io(err.to_string()))?;
        let mut buffer = vec![0_u8; STREAM_CHUNK];
        loop {
            let filled =
                file.read(&mut buffer).map_err(|err| RenderError::Io(err.to_string()))?;
            if filled == 0 {
                return Ok(());
            }
            if encode_base64 {
                let encoded = BASE64.encode(&buffer[.. filled]);
                sink(encoded.as_bytes()).map_err(RenderError::Io)?;
            } else {
                sink(&buffer[.. filled]).map_err(RenderError::Io)?;
            }
        }
    }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// The three-stage render pipeline, bound to the format directory root
/// and the filter timeout.
#[derive(Debug, Clone)]
pub struct ReportPipeline {
    /// System configuration root holding the format directories.
    sysconf_dir: PathBuf,
    /// Timeout applied to the `generate` filter.
    timeout: Duration,
}

impl ReportPipeline {
    /// Creates a pipeline rooted at `sysconf_dir`.
    #[must_use]
    pub fn new(sysconf_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            sysconf_dir: sysconf_dir.into(),
            timeout,
        }
    }

    /// Renders one report through one format.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] when the report or format is missing or
    /// inactive, the filter is absent or fails, or the store errs.
    pub fn render(
        &self,
        manage: &mut Manage,
        report_uuid: &str,
        format_uuid: &str,
        filters: &ReportFilters,
    ) -> Result<RenderedArtifact, RenderError> {
        let Some(report) = manage.find_report_by_uuid(report_uuid)? else {
            return Err(RenderError::MissingReport(report_uuid.to_string()));
        };
        let Some(format) = manage.find_report_format_by_uuid(format_uuid)? else {
            return Err(RenderError::MissingFormat(format_uuid.to_string()));
        };
        if !format.active {
            return Err(RenderError::InactiveFormat(format_uuid.to_string()));
        }
        let dir = TempDir::new().map_err(|err| RenderError::Io(err.to_string()))?;
        let xml_path = dir.path().join("report.xml");
        let document = build_xml(manage, &report, format_uuid, filters)?;
        fs::write(&xml_path, document).map_err(|err| RenderError::Io(err.to_string()))?;
        let format_dir = self.locate_format_dir(manage, format_uuid, format.owner)?;
        let generate = format_dir.join("generate");
        if !is_executable(&generate) {
            return Err(RenderError::MissingFilter(format_dir));
        }
        let artifact_path = dir.path().join(format!("report.{}", format.extension));
        let exit = ToolCommand::new(&generate, self.timeout)
            .current_dir(&format_dir)
            .arg(xml_path.display().to_string())
            .run_to_file(&artifact_path)?;
        if !exit.success() {
            return Err(RenderError::FilterFailed(exit));
        }
        Ok(RenderedArtifact {
            _dir: dir,
            path: artifact_path,
            content_type: format.content_type,
            extension: format.extension,
        })
    }

    /// Resolves the on-disk directory of a format: the owner-scoped tree
    /// when the format has an owner, the global tree otherwise.
    fn locate_format_dir(
        &self,
        manage: &mut Manage,
        format_uuid: &str,
        owner: Option<i64>,
    ) -> Result<PathBuf, RenderError> {
        let base = self.sysconf_dir.join("openvasmd");
        let dir = match owner {
            None => base.join("global_report_formats").join(format_uuid),
            Some(owner_rid) => {
                let owner_uuid = manage
                    .find_user_by_rid(owner_rid)?
                    .map(|user| user.uuid.as_str().to_string())
                    .unwrap_or_default();
                base.join("report_formats").join(owner_uuid).join(format_uuid)
            }
        };
        Ok(dir)
    }
}

/// Whether `path` exists and is executable.
fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).is_ok_and(|meta| {
            meta.is_file() && meta.permissions().mode() & 0o111 != 0
        })
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

// ============================================================================
// SECTION: Stage 1 - Canonical XML
// ============================================================================

/// Builds the canonical report document.
fn build_xml(
    manage: &mut Manage,
    report: &Report,
    format_uuid: &str,
    filters: &ReportFilters,
) -> Result<String, EntityError> {
    let (results, filtered_total) =
        manage.report_rendered_results(report.rid, &filters.results)?;
    let counts = manage.report_counts(report.rid, filters.results.apply_overrides)?;
    let hosts = manage.report_hosts(report.rid, filters.result_hosts_only)?;
    let task = task_identity(manage, report.task)?;
    let format_params = manage.report_format_params(format_uuid)?;

    let mut writer = XmlWriter::new();
    writer.open_with("report", &[("id", report.uuid.as_str())]);

    writer.open("report_format");
    for param in format_params {
        writer.open("param");
        writer.text_element("name", &param.name);
        writer.text_element("value", &param.value);
        writer.close();
    }
    writer.close();

    writer.open("sort");
    writer.open("field");
    writer.raw(match filters.results.sort_field {
        SortField::Port => "port",
        SortField::Type => "type",
    });
    writer.text_element(
        "order",
        if filters.results.sort_ascending { "ascending" } else { "descending" },
    );
    writer.close();
    writer.close();

    writer.open("filters");
    writer.raw(&crate::xml::escape_text(&filter_token(filters)));
    if filters.results.apply_overrides {
        writer.empty_element("apply_overrides");
    }
    if filters.include_notes {
        writer.empty_element("notes");
    }
    if filters.include_overrides {
        writer.empty_element("overrides");
    }
    if filters.result_hosts_only {
        writer.empty_element("result_hosts_only");
    }
    if let Some(floor) = filters.results.min_cvss_base {
        writer.text_element("min_cvss_base", &floor.to_string());
    }
    if !filters.results.search_phrase.is_empty() {
        writer.text_element("phrase", &filters.results.search_phrase);
    }
    writer.close();

    writer.text_element("scan_run_status", report.scan_run_status.name());
    writer.open_with("task", &[("id", task.0.as_str())]);
    writer.text_element("name", &task.1);
    writer.close();
    writer.text_element("scan_start", &report.start_time.to_string());

    let first = filters.results.first_result;
    let max = filters.results.max_results.map_or(-1, |max| {
        i64::try_from(max).unwrap_or(i64::MAX)
    });
    writer.open_with(
        "ports",
        &[("start", &(first + 1).to_string()), ("max", &max.to_string())],
    );
    let mut seen_ports: Vec<&str> = Vec::new();
    for result in &results {
        if !seen_ports.contains(&result.port.as_str()) {
            seen_ports.push(&result.port);
            writer.text_element("port", &result.port);
        }
    }
    writer.close();

    writer.open("result_count");
    writer.raw(&counts.total().to_string());
    writer.text_element("filtered", &filtered_total.to_string());
    writer.text_element("debug", &counts.debugs.to_string());
    writer.text_element("hole", &counts.holes.to_string());
    writer.text_element("info", &counts.infos.to_string());
    writer.text_element("log", &counts.logs.to_string());
    writer.text_element("warning", &counts.warnings.to_string());
    writer.text_element("false_positive", &counts.false_positives.to_string());
    writer.close();

    writer.open_with(
        "results",
        &[("start", &(first + 1).to_string()), ("max", &max.to_string())],
    );
    for result in &results {
        writer.open_with("result", &[("id", result.uuid.as_str())]);
        writer.text_element("subnet", &result.subnet);
        writer.text_element("host", &result.host);
        writer.text_element("port", &result.port);
        writer.open_with("nvt", &[("oid", &result.nvt_oid)]);
        writer.close();
        writer.text_element("threat", &result.threat);
        writer.text_element("description", &result.description);
        if filters.include_notes {
            write_notes(manage, &mut writer, result.rid, report.task, filters)?;
        }
        if filters.include_overrides {
            write_overrides(manage, &mut writer, result.rid, report.task, filters)?;
            if filters.overrides_details && result.threat != result.raw_type {
                writer.text_element("original_threat", &result.raw_type);
            }
        }
        writer.close();
    }
    writer.close();

    for host in &hosts {
        writer.open("host_start");
        writer.text_element("host", &host.host);
        writer.raw(&host.start_time.to_string());
        writer.close();
    }
    for host in &hosts {
        if host.end_time > 0 {
            writer.open("host_end");
            writer.text_element("host", &host.host);
            writer.raw(&host.end_time.to_string());
            writer.close();
        }
    }
    writer.text_element("scan_end", &report.end_time.to_string());
    writer.close();
    Ok(writer.finish())
}

/// Writes the notes applying to one result.
fn write_notes(
    manage: &mut Manage,
    writer: &mut XmlWriter,
    result_rid: i64,
    task_rid: i64,
    filters: &ReportFilters,
) -> Result<(), EntityError> {
    let notes = manage.notes_for_result(result_rid, task_rid)?;
    writer.open("notes");
    if filters.notes_details {
        for note in notes {
            writer.open_with("note", &[("id", note.uuid.as_str())]);
            writer.text_element("text", &note.text);
            writer.close();
        }
    } else {
        writer.raw(&notes.len().to_string());
    }
    writer.close();
    Ok(())
}

/// Writes the overrides applying to one result, in precedence order.
fn write_overrides(
    manage: &mut Manage,
    writer: &mut XmlWriter,
    result_rid: i64,
    task_rid: i64,
    filters: &ReportFilters,
) -> Result<(), EntityError> {
    let overrides = manage.overrides_for_result(result_rid, task_rid)?;
    writer.open("overrides");
    if filters.overrides_details {
        for entry in overrides {
            writer.open_with("override", &[("id", entry.uuid.as_str())]);
            writer.text_element("text", &entry.text);
            writer.text_element("new_threat", &entry.new_threat);
            writer.close();
        }
    } else {
        writer.raw(&overrides.len().to_string());
    }
    writer.close();
    Ok(())
}

/// Resolves a task's uuid and name.
fn task_identity(manage: &mut Manage, task_rid: i64) -> Result<(EntityUuid, String), EntityError> {
    let rows = manage.store().immediate(|tx| {
        tx.rows(
            "SELECT uuid, name FROM tasks WHERE rid = ?1",
            rusqlite::params![task_rid],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
    })?;
    let (uuid, name) = rows.into_iter().next().unwrap_or_default();
    Ok((EntityUuid::from_stored(uuid), name))
}

// ============================================================================
// SECTION: Notice Rendering
// ============================================================================

impl NoticeRenderer for ReportPipeline {
    fn render(
        &self,
        manage: &mut Manage,
        report_uuid: &str,
        format_uuid: &str,
    ) -> Result<Vec<u8>, String> {
        let filters = ReportFilters {
            results: ResultFilters {
                apply_overrides: true,
                ..ResultFilters::default()
            },
            ..ReportFilters::default()
        };
        let artifact = Self::render(self, manage, report_uuid, format_uuid, &filters)
            .map_err(|err| err.to_string())?;
        let bytes = artifact.bytes().map_err(|err| err.to_string());
        if bytes.is_err() {
            warn!(report = report_uuid, "notice artifact unreadable");
        }
        bytes
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use std::fs;
    use std::time::Duration;

    use scan_manager_core::RunStatus;
    use scan_manager_entities::CreateOutcome;
    use scan_manager_entities::Manage;
    use scan_manager_entities::reports::NewResult;
    use scan_manager_entities::tasks::NewTask;
    use scan_manager_store::Store;
    use scan_manager_store::initialize;
    use tempfile::TempDir;

    use super::ReportFilters;
    use super::ReportPipeline;
    use super::build_xml;

    fn manage_with_report() -> (Manage, String, i64) {
        let mut store = Store::open_in_memory().unwrap();
        initialize(&mut store).unwrap();
        let mut manage = Manage::new(store);
        let user = manage.ensure_user("alice").unwrap();
        manage.set_user(Some(user));
        let CreateOutcome::Created(task_uuid) = manage
            .create_task(&NewTask {
                name: "render me".to_string(),
                config: "daba56c8-73ec-11df-a475-002264764cea".to_string(),
                target: "b493b7a8-7489-11df-a3ec-002264764cea".to_string(),
                ..NewTask::default()
            })
            .unwrap()
        else {
            panic!("expected task create");
        };
        manage.set_task_requested(task_uuid.as_str()).unwrap();
        let task_rid = manage.find_task_by_uuid(task_uuid.as_str()).unwrap().unwrap().rid;
        let report_rid = manage
            .store()
            .immediate(|tx| {
                tx.scalar_i64(
                    "SELECT rid FROM reports WHERE task = ?1",
                    rusqlite::params![task_rid],
                )
            })
            .unwrap();
        manage
            .add_report_result(
                report_rid,
                &NewResult {
                    host: "10.0.0.1".to_string(),
                    port: "80/tcp".to_string(),
                    nvt: "OID-A".to_string(),
                    result_type: "Security Warning".to_string(),
                    description: "weak banner".to_string(),
                    ..NewResult::default()
                },
            )
            .unwrap();
        manage.set_task_run_status(task_rid, RunStatus::Done).unwrap();
        let report_uuid = manage
            .store()
            .immediate(|tx| {
                tx.scalar_string(
                    "SELECT uuid FROM reports WHERE rid = ?1",
                    rusqlite::params![report_rid],
                )
            })
            .unwrap();
        (manage, report_uuid, report_rid)
    }

    #[test]
    fn canonical_xml_carries_counts_and_threats() {
        let (mut manage, report_uuid, _) = manage_with_report();
        let report = manage.find_report_by_uuid(&report_uuid).unwrap().unwrap();
        let document = build_xml(
            &mut manage,
            &report,
            "19f6f1b3-7128-4433-888c-ccc764fe6ed5",
            &ReportFilters::default(),
        )
        .unwrap();
        assert!(document.starts_with(&format!("<report id=\"{report_uuid}\"")));
        assert!(document.contains("<scan_run_status>Done</scan_run_status>"));
        assert!(document.contains("<warning>1</warning>"));
        assert!(document.contains("<threat>Security Warning</threat>"));
        assert!(document.contains("<name>render me</name>"));
        assert!(document.ends_with("</report>"));
    }

    #[test]
    fn filter_runs_in_its_directory_and_stdout_is_the_artifact() {
        let (mut manage, report_uuid, _) = manage_with_report();
        let sysconf = TempDir::new().unwrap();
        let format_dir = sysconf
            .path()
            .join("openvasmd/global_report_formats/19f6f1b3-7128-4433-888c-ccc764fe6ed5");
        fs::create_dir_all(&format_dir).unwrap();
        let generate = format_dir.join("generate");
        fs::write(&generate, "#!/bin/sh\nwc -c < \"$1\"\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&generate, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let pipeline = ReportPipeline::new(sysconf.path(), Duration::from_secs(10));
        let artifact = pipeline
            .render(
                &mut manage,
                &report_uuid,
                "19f6f1b3-7128-4433-888c-ccc764fe6ed5",
                &ReportFilters::default(),
            )
            .expect("render");
        let bytes = artifact.bytes().unwrap();
        let size: i64 = String::from_utf8_lossy(&bytes).trim().parse().unwrap();
        assert!(size > 0);
        assert_eq!(artifact.content_type, "text/plain");
        assert_eq!(artifact.extension, "txt");
    }

    #[test]
    fn missing_filter_is_a_specific_error() {
        let (mut manage, report_uuid, _) = manage_with_report();
        let sysconf = TempDir::new().unwrap();
        let pipeline = ReportPipeline::new(sysconf.path(), Duration::from_secs(5));
        let error = pipeline
            .render(
                &mut manage,
                &report_uuid,
                "19f6f1b3-7128-4433-888c-ccc764fe6ed5",
                &ReportFilters::default(),
            )
            .unwrap_err();
        assert!(matches!(error, super::RenderError::MissingFilter(_)));
    }

    #[test]
    fn streaming_chunks_round_trip() {
        let (mut manage, report_uuid, _) = manage_with_report();
        let sysconf = TempDir::new().unwrap();
        let format_dir = sysconf
            .path()
            .join("openvasmd/global_report_formats/19f6f1b3-7128-4433-888c-ccc764fe6ed5");
        fs::create_dir_all(&format_dir).unwrap();
        let generate = format_dir.join("generate");
        fs::write(&generate, "#!/bin/sh\ncat \"$1\"\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&generate, fs::Permissions::from_mode(0o755)).unwrap();
        }
        let pipeline = ReportPipeline::new(sysconf.path(), Duration::from_secs(10));
        let artifact = pipeline
            .render(
                &mut manage,
                &report_uuid,
                "19f6f1b3-7128-4433-888c-ccc764fe6ed5",
                &ReportFilters::default(),
            )
            .unwrap();
        let mut streamed = Vec::new();
        artifact
            .stream(false, &mut |chunk| {
                streamed.extend_from_slice(chunk);
                Ok(())
            })
            .unwrap();
        assert_eq!(streamed, artifact.bytes().unwrap());
    }
}
