// crates/scan-manager-escalate/src/lib.rs
// ============================================================================
// Module: Escalation Engine
// Description: Matches escalators against task events and dispatches their
//              methods.
// Purpose: Evaluate event, condition, and method per bound escalator, in
//          definition order, with non-fatal method failures.
// Dependencies: scan-manager-core, scan-manager-entities
// ============================================================================

//! ## Overview
//! On every task run-status change the lifecycle hands the event here.
//! The engine enumerates the task's escalators in definition order, keeps
//! those whose event and `status` parameter match, evaluates the
//! condition against the threat aggregates, and runs the method: mail
//! through the local sendmail binary, a single substituted HTTP GET
//! through wget, or a line through the logging subsystem. A failing
//! method is logged and skipped; it never affects the task.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use scan_manager_core::ConditionKind;
use scan_manager_core::EventKind;
use scan_manager_core::MethodKind;
use scan_manager_core::TaskEvent;
use scan_manager_core::ThreatLevel;
use scan_manager_core::ToolCommand;
use scan_manager_entities::EntityError;
use scan_manager_entities::Manage;
use scan_manager_entities::escalators::Escalator;
use thiserror::Error;
use tracing::info;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fallback report format for mail inclusion: the predefined TXT format.
const TXT_FORMAT_UUID: &str = "19f6f1b3-7128-4433-888c-ccc764fe6ed5";

/// Default sender for escalation mail.
const DEFAULT_FROM_ADDRESS: &str = "automated@openvas.org";

/// Included reports are cut at this many bytes.
const NOTICE_ATTACHMENT_LIMIT: usize = 2_000;

/// Marker appended to a truncated inclusion.
const TRUNCATION_MARKER: &str = "\n... (report truncated after 2000 characters)\n";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Engine failure. Method failures are not errors; they are logged and
/// counted out.
#[derive(Debug, Error)]
pub enum EscalateError {
    /// Underlying repository failure.
    #[error(transparent)]
    Entity(#[from] EntityError),
}

// ============================================================================
// SECTION: Tools
// ============================================================================

/// Renders a report for mail inclusion. Implemented by the report
/// pipeline; injected so the engine stays free of the rendering stack.
pub trait NoticeRenderer {
    /// Renders the report through the named format and returns the
    /// artifact bytes.
    ///
    /// # Errors
    ///
    /// Returns a display message when rendering fails.
    fn render(
        &self,
        manage: &mut Manage,
        report_uuid: &str,
        format_uuid: &str,
    ) -> Result<Vec<u8>, String>;
}

/// Outbound tool paths and limits for the engine.
#[derive(Debug, Clone)]
pub struct EscalateTools {
    /// Path to the sendmail binary.
    pub sendmail: PathBuf,
    /// Path to the wget binary.
    pub wget: PathBuf,
    /// Timeout applied to each outbound tool run.
    pub timeout: Duration,
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Dispatches one task event to every matching escalator bound to the
/// task. Returns the number of methods that ran successfully.
///
/// # Errors
///
/// Returns [`EscalateError`] on store failure while reading escalators or
/// aggregates. Method failures are logged, not returned.
pub fn escalate_event(
    manage: &mut Manage,
    tools: &EscalateTools,
    renderer: Option<&dyn NoticeRenderer>,
    event: &TaskEvent,
) -> Result<usize, EscalateError> {
    let escalators = manage.task_escalators(event.task_rid)?;
    let mut dispatched = 0;
    for escalator in escalators {
        if !event_matches(&escalator, event) {
            continue;
        }
        if !condition_holds(manage, &escalator, event)? {
            continue;
        }
        let sent = match escalator.method {
            MethodKind::Email => run_email(manage, tools, renderer, &escalator, event),
            MethodKind::HttpGet => run_http_get(tools, &escalator, event),
            MethodKind::Syslog => run_syslog(&escalator, event),
        };
        if sent {
            dispatched += 1;
        }
    }
    Ok(dispatched)
}

/// Whether the escalator's event and `status` parameter match the event.
fn event_matches(escalator: &Escalator, event: &TaskEvent) -> bool {
    escalator.event == EventKind::TaskRunStatusChanged
        && escalator.event_data.get("status").map(String::as_str)
            == Some(event.status.name())
}

/// Evaluates the escalator's condition against the task aggregates.
fn condition_holds(
    manage: &mut Manage,
    escalator: &Escalator,
    event: &TaskEvent,
) -> Result<bool, EscalateError> {
    match escalator.condition {
        ConditionKind::Always => Ok(true),
        ConditionKind::ThreatLevelAtLeast => {
            let Some(floor) = escalator
                .condition_data
                .get("level")
                .and_then(|level| ThreatLevel::parse(level))
            else {
                return Ok(false);
            };
            let level = manage.task_threat_level(event.task_rid, true)?;
            Ok(level.is_some_and(|level| level >= floor))
        }
        ConditionKind::ThreatLevelChanged => {
            let direction = escalator
                .condition_data
                .get("direction")
                .map_or("changed", String::as_str);
            let level = manage.task_threat_level(event.task_rid, true)?;
            let previous = manage.task_previous_threat_level(event.task_rid, true)?;
            Ok(match direction {
                "increased" => level > previous,
                "decreased" => level < previous,
                _ => level != previous,
            })
        }
    }
}

/// Condition text for messages and `$c` substitution.
fn condition_description(escalator: &Escalator) -> String {
    match escalator.condition {
        ConditionKind::Always => "Always".to_string(),
        ConditionKind::ThreatLevelAtLeast => {
            let level = escalator.condition_data.get("level").map_or("", String::as_str);
            format!("Task threat level is at least '{level}'")
        }
        ConditionKind::ThreatLevelChanged => "Task threat level changed".to_string(),
    }
}

// ============================================================================
// SECTION: Methods
// ============================================================================

/// Runs the Email method through sendmail.
fn run_email(
    manage: &mut Manage,
    tools: &EscalateTools,
    renderer: Option<&dyn NoticeRenderer>,
    escalator: &Escalator,
    event: &TaskEvent,
) -> bool {
    let Some(to_address) = escalator.method_data.get("to_address") else {
        warn!(escalator = %escalator.name, "email escalator has no to_address");
        return false;
    };
    let from_address = escalator
        .method_data
        .get("from_address")
        .map_or(DEFAULT_FROM_ADDRESS, String::as_str);
    let subject = format!(
        "[OpenVAS-Manager] Task '{}': {}",
        event.task_name,
        event.description()
    );
    let mut body = format!(
        "Task: {}\nEvent: {}\nCondition: {}\n",
        event.task_name,
        event.description(),
        condition_description(escalator)
    );
    // notice == "0" means "include the report" rather than a bare notice.
    if escalator.method_data.get("notice").map(String::as_str) == Some("0") {
        body.push('\n');
        body.push_str(&notice_inclusion(manage, renderer, escalator, event));
    }
    let message = format!("To: {to_address}\nFrom: {from_address}\nSubject: {subject}\n\n{body}");
    let run = ToolCommand::new(&tools.sendmail, tools.timeout)
        .arg(to_address.clone())
        .stdin_bytes(message.into_bytes())
        .run();
    match run {
        Ok(output) if output.exit.success() => true,
        Ok(output) => {
            warn!(escalator = %escalator.name, exit = ?output.exit, "sendmail failed");
            false
        }
        Err(err) => {
            warn!(escalator = %escalator.name, error = %err, "sendmail did not run");
            false
        }
    }
}

/// Renders the most recent completed report for inclusion, truncated at
/// the notice limit.
fn notice_inclusion(
    manage: &mut Manage,
    renderer: Option<&dyn NoticeRenderer>,
    escalator: &Escalator,
    event: &TaskEvent,
) -> String {
    let Some(renderer) = renderer else {
        return "(report rendering unavailable)\n".to_string();
    };
    let report_uuid = match manage.task_reports(event.task_rid) {
        Ok(reports) => reports
            .into_iter()
            .find(|report| report.end_time > 0)
            .map(|report| report.uuid.as_str().to_string()),
        Err(err) => {
            warn!(error = %err, "could not list reports for mail inclusion");
            None
        }
    };
    let Some(report_uuid) = report_uuid else {
        return "(no finished report to include)\n".to_string();
    };
    let format_uuid = escalator
        .method_data
        .get("notice_report_format")
        .map_or(TXT_FORMAT_UUID, String::as_str);
    match renderer.render(manage, &report_uuid, format_uuid) {
        Ok(artifact) => {
            let mut text = String::from_utf8_lossy(&artifact).into_owned();
            if text.len() > NOTICE_ATTACHMENT_LIMIT {
                let mut cut = NOTICE_ATTACHMENT_LIMIT;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
                text.push_str(TRUNCATION_MARKER);
            }
            text
        }
        Err(message) => {
            warn!(message, "report inclusion failed");
            "(report rendering failed)\n".to_string()
        }
    }
}

/// Runs the HTTP Get method through wget, once, with substitutions.
fn run_http_get(tools: &EscalateTools, escalator: &Escalator, event: &TaskEvent) -> bool {
    let Some(url_template) = escalator.method_data.get("URL") else {
        warn!(escalator = %escalator.name, "http get escalator has no URL");
        return false;
    };
    let url = substitute_url(url_template, escalator, event);
    let run = ToolCommand::new(&tools.wget, tools.timeout)
        .arg("-O")
        .arg("-")
        .arg(url)
        .run();
    match run {
        Ok(output) if output.exit.success() => true,
        Ok(output) => {
            warn!(escalator = %escalator.name, exit = ?output.exit, "wget failed");
            false
        }
        Err(err) => {
            warn!(escalator = %escalator.name, error = %err, "wget did not run");
            false
        }
    }
}

/// Applies the `$$`, `$c`, `$e`, `$n` substitutions to a URL template.
fn substitute_url(template: &str, escalator: &Escalator, event: &TaskEvent) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(current) = chars.next() {
        if current != '$' {
            out.push(current);
            continue;
        }
        match chars.next() {
            Some('$') => out.push('$'),
            Some('c') => out.push_str(&condition_description(escalator)),
            Some('e') => out.push_str(&event.description()),
            Some('n') => out.push_str(&event.task_name),
            Some(other) => {
                out.push('$');
                out.push(other);
            }
            None => out.push('$'),
        }
    }
    out
}

/// Runs the Syslog method through the logging subsystem.
fn run_syslog(escalator: &Escalator, event: &TaskEvent) -> bool {
    let submethod = escalator.method_data.get("submethod").map_or("syslog", String::as_str);
    info!(
        target: "escalation",
        submethod,
        task = %event.task_name,
        "event {}",
        event.description()
    );
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use scan_manager_core::ConditionKind;
    use scan_manager_core::EntityUuid;
    use scan_manager_core::EventKind;
    use scan_manager_core::MethodKind;
    use scan_manager_core::RunStatus;
    use scan_manager_core::TaskEvent;
    use scan_manager_entities::CreateOutcome;
    use scan_manager_entities::Manage;
    use scan_manager_entities::escalators::Escalator;
    use scan_manager_entities::escalators::NewEscalator;
    use scan_manager_store::Store;
    use scan_manager_store::initialize;

    use super::EscalateTools;
    use super::escalate_event;
    use super::event_matches;
    use super::substitute_url;

    fn manage_with_user() -> Manage {
        let mut store = Store::open_in_memory().unwrap();
        initialize(&mut store).unwrap();
        let mut manage = Manage::new(store);
        let user = manage.ensure_user("alice").unwrap();
        manage.set_user(Some(user));
        manage
    }

    fn tools() -> EscalateTools {
        EscalateTools {
            // `true` stands in for sendmail/wget: accepts anything.
            sendmail: PathBuf::from("true"),
            wget: PathBuf::from("true"),
            timeout: Duration::from_secs(5),
        }
    }

    fn done_event(task_rid: i64, name: &str) -> TaskEvent {
        TaskEvent {
            task_rid,
            task_uuid: EntityUuid::generate(),
            task_name: name.to_string(),
            status: RunStatus::Done,
        }
    }

    fn sample_escalator(condition: ConditionKind, method: MethodKind) -> Escalator {
        let mut event_data = BTreeMap::new();
        event_data.insert("status".to_string(), "Done".to_string());
        Escalator {
            rid: 1,
            uuid: EntityUuid::generate(),
            owner: None,
            name: "sample".to_string(),
            comment: String::new(),
            event: EventKind::TaskRunStatusChanged,
            condition,
            method,
            event_data,
            condition_data: BTreeMap::new(),
            method_data: BTreeMap::new(),
        }
    }

    #[test]
    fn status_parameter_gates_the_event() {
        let escalator = sample_escalator(ConditionKind::Always, MethodKind::Syslog);
        assert!(event_matches(&escalator, &done_event(1, "t")));
        let stopped = TaskEvent {
            status: RunStatus::Stopped,
            ..done_event(1, "t")
        };
        assert!(!event_matches(&escalator, &stopped));
    }

    #[test]
    fn url_substitution_handles_all_tokens() {
        let escalator = sample_escalator(ConditionKind::Always, MethodKind::HttpGet);
        let event = done_event(1, "DMZ sweep");
        let url = substitute_url("http://cb/?t=$n&e=$e&c=$c&x=$$&tail=$z", &escalator, &event);
        assert_eq!(
            url,
            "http://cb/?t=DMZ sweep&e=Task status changed to 'Done'&c=Always&x=$&tail=$z"
        );
    }

    #[test]
    fn bound_syslog_escalator_dispatches_on_match() {
        let mut manage = manage_with_user();
        let CreateOutcome::Created(task_uuid) = manage
            .create_task(&scan_manager_entities::tasks::NewTask {
                name: "escalated".to_string(),
                config: "daba56c8-73ec-11df-a475-002264764cea".to_string(),
                target: "b493b7a8-7489-11df-a3ec-002264764cea".to_string(),
                ..scan_manager_entities::tasks::NewTask::default()
            })
            .unwrap()
        else {
            panic!("expected task create");
        };
        let mut event_data = BTreeMap::new();
        event_data.insert("status".to_string(), "Done".to_string());
        let CreateOutcome::Created(escalator_uuid) = manage
            .create_escalator(&NewEscalator {
                name: "log it".to_string(),
                comment: String::new(),
                event: EventKind::TaskRunStatusChanged,
                condition: ConditionKind::Always,
                method: MethodKind::Syslog,
                event_data,
                condition_data: BTreeMap::new(),
                method_data: BTreeMap::new(),
            })
            .unwrap()
        else {
            panic!("expected escalator create");
        };
        manage
            .add_task_escalator(task_uuid.as_str(), escalator_uuid.as_str())
            .unwrap();
        let task_rid = manage.find_task_by_uuid(task_uuid.as_str()).unwrap().unwrap().rid;
        let hits = escalate_event(&mut manage, &tools(), None, &done_event(task_rid, "escalated"))
            .unwrap();
        assert_eq!(hits, 1);
        // A non-matching status dispatches nothing.
        let stopped = TaskEvent {
            status: RunStatus::Stopped,
            ..done_event(task_rid, "escalated")
        };
        assert_eq!(escalate_event(&mut manage, &tools(), None, &stopped).unwrap(), 0);
    }
}
