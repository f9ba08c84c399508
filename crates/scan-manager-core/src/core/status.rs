// crates/scan-manager-core/src/core/status.rs
// ============================================================================
// Module: Task Run Status and Trust Levels
// Description: The task lifecycle state set and installer trust values.
// Purpose: Provide stable store codes, display names, and the active /
//          terminal predicates the lifecycle component builds on.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A task's `run_status` is the authoritative record of where a scan is.
//! Codes are stable store values; display names are the tokens the control
//! protocol shows, with the transient `*_WAITING` states presented as their
//! requested counterparts. The only writer of the column is the lifecycle
//! component in `scan-manager-entities`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Task lifecycle state.
///
/// # Invariants
/// - Store codes are stable; new states append, existing codes never move.
/// - `is_active` and `is_terminal` partition the set as the lifecycle
///   contract requires (`New` is terminal: the task never ran).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Delete requested while the task was active; removal is deferred.
    DeleteRequested,
    /// Scan finished normally.
    Done,
    /// Task has never been started.
    New,
    /// Start requested, scanner acknowledgement pending.
    Requested,
    /// Scan in progress.
    Running,
    /// Pause requested by the client.
    PauseRequested,
    /// Pause request forwarded, scanner acknowledgement pending.
    PauseWaiting,
    /// Scan paused.
    Paused,
    /// Resume requested by the client.
    ResumeRequested,
    /// Resume request forwarded, scanner acknowledgement pending.
    ResumeWaiting,
    /// Stop requested by the client.
    StopRequested,
    /// Stop request forwarded, scanner acknowledgement pending.
    StopWaiting,
    /// Scan stopped before completion.
    Stopped,
    /// Scan aborted by an internal error.
    InternalError,
}

impl RunStatus {
    /// Returns the stable store code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::DeleteRequested => 0,
            Self::Done => 1,
            Self::New => 2,
            Self::Requested => 3,
            Self::Running => 4,
            Self::PauseRequested => 5,
            Self::PauseWaiting => 6,
            Self::Paused => 7,
            Self::ResumeRequested => 8,
            Self::ResumeWaiting => 9,
            Self::StopRequested => 10,
            Self::StopWaiting => 11,
            Self::Stopped => 12,
            Self::InternalError => 13,
        }
    }

    /// Decodes a store code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::DeleteRequested),
            1 => Some(Self::Done),
            2 => Some(Self::New),
            3 => Some(Self::Requested),
            4 => Some(Self::Running),
            5 => Some(Self::PauseRequested),
            6 => Some(Self::PauseWaiting),
            7 => Some(Self::Paused),
            8 => Some(Self::ResumeRequested),
            9 => Some(Self::ResumeWaiting),
            10 => Some(Self::StopRequested),
            11 => Some(Self::StopWaiting),
            12 => Some(Self::Stopped),
            13 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Returns the protocol display name. The `*_WAITING` states present as
    /// their requested counterparts.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DeleteRequested => "Delete Requested",
            Self::Done => "Done",
            Self::New => "New",
            Self::Requested => "Requested",
            Self::Running => "Running",
            Self::PauseRequested | Self::PauseWaiting => "Pause Requested",
            Self::Paused => "Paused",
            Self::ResumeRequested | Self::ResumeWaiting => "Resume Requested",
            Self::StopRequested | Self::StopWaiting => "Stop Requested",
            Self::Stopped => "Stopped",
            Self::InternalError => "Internal Error",
        }
    }

    /// Parses a protocol display name. Waiting states have no distinct name
    /// and parse to the requested variant.
    #[must_use]
    pub fn parse_name(name: &str) -> Option<Self> {
        match name {
            "Delete Requested" => Some(Self::DeleteRequested),
            "Done" => Some(Self::Done),
            "New" => Some(Self::New),
            "Requested" => Some(Self::Requested),
            "Running" => Some(Self::Running),
            "Pause Requested" => Some(Self::PauseRequested),
            "Paused" => Some(Self::Paused),
            "Resume Requested" => Some(Self::ResumeRequested),
            "Stop Requested" => Some(Self::StopRequested),
            "Stopped" => Some(Self::Stopped),
            "Internal Error" => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Whether the task is active: it cannot be started, deleted in place,
    /// or modified structurally while in one of these states.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Requested
                | Self::Running
                | Self::PauseRequested
                | Self::PauseWaiting
                | Self::Paused
                | Self::ResumeRequested
                | Self::ResumeWaiting
                | Self::StopRequested
                | Self::StopWaiting
                | Self::DeleteRequested
        )
    }

    /// Whether the task sits in a terminal state and may be started.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::New | Self::Done | Self::Stopped | Self::InternalError)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SECTION: Trust Level
// ============================================================================

/// Signature trust recorded for agent installers and report formats.
///
/// # Invariants
/// - Store codes are stable: 0 error, 1 yes, 2 no, 3 unknown.
/// - Verification failure maps to `Unknown`, never to `Yes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Verification could not run.
    Error,
    /// Signature verified.
    Yes,
    /// Signature present and invalid.
    No,
    /// No signature, or the verifier gave an indeterminate answer.
    Unknown,
}

impl TrustLevel {
    /// Returns the stable store code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Error => 0,
            Self::Yes => 1,
            Self::No => 2,
            Self::Unknown => 3,
        }
    }

    /// Decodes a store code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Error),
            1 => Some(Self::Yes),
            2 => Some(Self::No),
            3 => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Returns the protocol token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Yes => "yes",
            Self::No => "no",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::RunStatus;
    use super::TrustLevel;

    /// Every lifecycle state, for exhaustive table checks.
    const ALL: [RunStatus; 14] = [
        RunStatus::DeleteRequested,
        RunStatus::Done,
        RunStatus::New,
        RunStatus::Requested,
        RunStatus::Running,
        RunStatus::PauseRequested,
        RunStatus::PauseWaiting,
        RunStatus::Paused,
        RunStatus::ResumeRequested,
        RunStatus::ResumeWaiting,
        RunStatus::StopRequested,
        RunStatus::StopWaiting,
        RunStatus::Stopped,
        RunStatus::InternalError,
    ];

    #[test]
    fn codes_round_trip() {
        for status in ALL {
            assert_eq!(RunStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(RunStatus::from_code(14), None);
        assert_eq!(RunStatus::from_code(-1), None);
    }

    #[test]
    fn active_and_terminal_partition_the_set() {
        for status in ALL {
            assert_ne!(status.is_active(), status.is_terminal(), "{status}");
        }
    }

    #[test]
    fn waiting_states_present_as_requested() {
        assert_eq!(RunStatus::PauseWaiting.name(), "Pause Requested");
        assert_eq!(RunStatus::ResumeWaiting.name(), "Resume Requested");
        assert_eq!(RunStatus::StopWaiting.name(), "Stop Requested");
    }

    #[test]
    fn trust_codes_round_trip() {
        for trust in [TrustLevel::Error, TrustLevel::Yes, TrustLevel::No, TrustLevel::Unknown] {
            assert_eq!(TrustLevel::from_code(trust.code()), Some(trust));
        }
        assert_eq!(TrustLevel::from_code(4), None);
    }
}
