// crates/scan-manager-core/src/core/escalator.rs
// ============================================================================
// Module: Escalator Codes and Task Events
// Description: Event, condition, and method code sets plus the task event
//              value that drives escalation.
// Purpose: Provide stable store codes and display text for escalators.
// Dependencies: crate::core::{identifiers, status}, serde
// ============================================================================

//! ## Overview
//! An escalator binds an event code, a condition code, and a method code;
//! per-code string parameters live in side tables keyed by the escalator
//! row. The codes here are the stable store values. The only event the
//! lifecycle emits today is `TaskRunStatusChanged`; the sets are enums so
//! new codes append without renumbering.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::EntityUuid;
use crate::core::status::RunStatus;

// ============================================================================
// SECTION: Event Codes
// ============================================================================

/// Escalator event code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A task's run status changed; parameter `status` names the new status.
    TaskRunStatusChanged,
}

impl EventKind {
    /// Returns the stable store code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::TaskRunStatusChanged => 1,
        }
    }

    /// Decodes a store code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::TaskRunStatusChanged),
            _ => None,
        }
    }

    /// Returns the protocol token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TaskRunStatusChanged => "Task run status changed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Condition Codes
// ============================================================================

/// Escalator condition code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    /// Fire unconditionally.
    Always,
    /// Fire when the task threat level is at least the `level` parameter.
    ThreatLevelAtLeast,
    /// Fire when the threat level moved in the `direction` parameter's
    /// direction (`changed`, `increased`, or `decreased`).
    ThreatLevelChanged,
}

impl ConditionKind {
    /// Returns the stable store code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Always => 1,
            Self::ThreatLevelAtLeast => 2,
            Self::ThreatLevelChanged => 3,
        }
    }

    /// Decodes a store code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Always),
            2 => Some(Self::ThreatLevelAtLeast),
            3 => Some(Self::ThreatLevelChanged),
            _ => None,
        }
    }

    /// Returns the protocol token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::ThreatLevelAtLeast => "Threat level at least",
            Self::ThreatLevelChanged => "Threat level changed",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Method Codes
// ============================================================================

/// Escalator method code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// Send mail through the local sendmail binary.
    Email,
    /// Fetch a URL once, with substitutions applied.
    HttpGet,
    /// Emit a line through the local logging subsystem.
    Syslog,
}

impl MethodKind {
    /// Returns the stable store code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Email => 1,
            Self::HttpGet => 2,
            Self::Syslog => 3,
        }
    }

    /// Decodes a store code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Email),
            2 => Some(Self::HttpGet),
            3 => Some(Self::Syslog),
            _ => None,
        }
    }

    /// Returns the protocol token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::HttpGet => "HTTP Get",
            Self::Syslog => "Syslog",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Task Events
// ============================================================================

/// Event emitted by the task lifecycle after every committed status write.
///
/// # Invariants
/// - The event is emitted after the database write, under the credentials
///   of the user whose action caused the transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    /// Row id of the task.
    pub task_rid: i64,
    /// Stable identifier of the task.
    pub task_uuid: EntityUuid,
    /// Task name at the time of the transition.
    pub task_name: String,
    /// The new run status.
    pub status: RunStatus,
}

impl TaskEvent {
    /// Human-readable event description used in mail subjects and `$e`
    /// substitution.
    #[must_use]
    pub fn description(&self) -> String {
        format!("Task status changed to '{}'", self.status.name())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ConditionKind;
    use super::EventKind;
    use super::MethodKind;
    use super::TaskEvent;
    use crate::core::identifiers::EntityUuid;
    use crate::core::status::RunStatus;

    #[test]
    fn codes_round_trip() {
        assert_eq!(EventKind::from_code(1), Some(EventKind::TaskRunStatusChanged));
        assert_eq!(EventKind::from_code(0), None);
        for condition in
            [ConditionKind::Always, ConditionKind::ThreatLevelAtLeast, ConditionKind::ThreatLevelChanged]
        {
            assert_eq!(ConditionKind::from_code(condition.code()), Some(condition));
        }
        for method in [MethodKind::Email, MethodKind::HttpGet, MethodKind::Syslog] {
            assert_eq!(MethodKind::from_code(method.code()), Some(method));
        }
    }

    #[test]
    fn event_description_names_the_new_status() {
        let event = TaskEvent {
            task_rid: 7,
            task_uuid: EntityUuid::generate(),
            task_name: "Weekly DMZ".to_string(),
            status: RunStatus::Done,
        };
        assert_eq!(event.description(), "Task status changed to 'Done'");
    }
}
