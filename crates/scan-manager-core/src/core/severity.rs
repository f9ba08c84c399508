// crates/scan-manager-core/src/core/severity.rs
// ============================================================================
// Module: Severity and Threat Orders
// Description: Raw result severities and user-facing threat tokens.
// Purpose: Provide total orders matching the store collations and the
//          mapping between raw labels and threat levels.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Results arrive from the scanner with a raw severity label (`Security
//! Hole`, `Security Warning`, ...). Aggregation and the client protocol use
//! the shorter threat tokens (`High`, `Medium`, ...). Both carry a total
//! order with the most severe value greatest, so `Ord::max` selects the
//! report-level threat. The store registers matching collations that sort
//! most-severe-first; see `scan-manager-store`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Raw Severity
// ============================================================================

/// Raw severity label attached to a scanner result.
///
/// # Invariants
/// - `Ord` ranks `SecurityHole` greatest and `FalsePositive` least.
/// - The textual forms are the exact labels the scanner emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// "False Positive" result.
    FalsePositive,
    /// "Debug Message" result.
    DebugMessage,
    /// "Log Message" result.
    LogMessage,
    /// "Security Note" result.
    SecurityNote,
    /// "Security Warning" result.
    SecurityWarning,
    /// "Security Hole" result.
    SecurityHole,
}

impl MessageType {
    /// All labels ordered most severe first.
    pub const DESCENDING: [Self; 6] = [
        Self::SecurityHole,
        Self::SecurityWarning,
        Self::SecurityNote,
        Self::LogMessage,
        Self::DebugMessage,
        Self::FalsePositive,
    ];

    /// Returns the scanner-facing label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SecurityHole => "Security Hole",
            Self::SecurityWarning => "Security Warning",
            Self::SecurityNote => "Security Note",
            Self::LogMessage => "Log Message",
            Self::DebugMessage => "Debug Message",
            Self::FalsePositive => "False Positive",
        }
    }

    /// Parses a scanner label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "Security Hole" => Some(Self::SecurityHole),
            "Security Warning" => Some(Self::SecurityWarning),
            "Security Note" => Some(Self::SecurityNote),
            "Log Message" => Some(Self::LogMessage),
            "Debug Message" => Some(Self::DebugMessage),
            "False Positive" => Some(Self::FalsePositive),
            _ => None,
        }
    }

    /// Severity rank; greater is more severe.
    #[must_use]
    const fn rank(self) -> u8 {
        match self {
            Self::FalsePositive => 0,
            Self::DebugMessage => 1,
            Self::LogMessage => 2,
            Self::SecurityNote => 3,
            Self::SecurityWarning => 4,
            Self::SecurityHole => 5,
        }
    }

    /// Compares two raw labels the way the `collate_message_type` collation
    /// does: most severe sorts first, unknown labels after all known ones in
    /// byte order.
    #[must_use]
    pub fn collate(left: &str, right: &str) -> Ordering {
        match (Self::parse(left), Self::parse(right)) {
            (Some(a), Some(b)) => b.rank().cmp(&a.rank()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => left.cmp(right),
        }
    }
}

impl Ord for MessageType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for MessageType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Threat Level
// ============================================================================

/// User-facing threat token used in aggregation and the client protocol.
///
/// # Invariants
/// - `Ord` ranks `High` greatest and `FalsePositive` least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    /// "False Positive" threat.
    FalsePositive,
    /// "Debug" threat.
    Debug,
    /// "Log" threat.
    Log,
    /// "Low" threat.
    Low,
    /// "Medium" threat.
    Medium,
    /// "High" threat.
    High,
}

impl ThreatLevel {
    /// Returns the protocol token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Log => "Log",
            Self::Debug => "Debug",
            Self::FalsePositive => "False Positive",
        }
    }

    /// Parses a protocol token.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "High" => Some(Self::High),
            "Medium" => Some(Self::Medium),
            "Low" => Some(Self::Low),
            "Log" => Some(Self::Log),
            "Debug" => Some(Self::Debug),
            "False Positive" => Some(Self::FalsePositive),
            _ => None,
        }
    }

    /// Threat rank; greater is more severe.
    #[must_use]
    const fn rank(self) -> u8 {
        match self {
            Self::FalsePositive => 0,
            Self::Debug => 1,
            Self::Log => 2,
            Self::Low => 3,
            Self::Medium => 4,
            Self::High => 5,
        }
    }

    /// Compares two threat tokens the way the `collate_threat` collation
    /// does: most severe sorts first, unknown tokens after all known ones in
    /// byte order.
    #[must_use]
    pub fn collate(left: &str, right: &str) -> Ordering {
        match (Self::parse(left), Self::parse(right)) {
            (Some(a), Some(b)) => b.rank().cmp(&a.rank()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => left.cmp(right),
        }
    }
}

impl Ord for ThreatLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for ThreatLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<MessageType> for ThreatLevel {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::SecurityHole => Self::High,
            MessageType::SecurityWarning => Self::Medium,
            MessageType::SecurityNote => Self::Low,
            MessageType::LogMessage => Self::Log,
            MessageType::DebugMessage => Self::Debug,
            MessageType::FalsePositive => Self::FalsePositive,
        }
    }
}

impl fmt::Display for ThreatLevel {
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

    use std::cmp::Ordering;

    use proptest::prelude::proptest;

    use super::MessageType;
    use super::ThreatLevel;

    #[test]
    fn hole_outranks_everything() {
        for label in MessageType::DESCENDING {
            assert!(MessageType::SecurityHole >= label);
        }
    }

    #[test]
    fn collate_sorts_most_severe_first() {
        assert_eq!(
            MessageType::collate("Security Hole", "Security Warning"),
            Ordering::Less
        );
        assert_eq!(
            MessageType::collate("False Positive", "Debug Message"),
            Ordering::Greater
        );
        assert_eq!(MessageType::collate("Log Message", "Log Message"), Ordering::Equal);
    }

    #[test]
    fn unknown_labels_sort_after_known() {
        assert_eq!(MessageType::collate("Security Hole", "bogus"), Ordering::Less);
        assert_eq!(MessageType::collate("bogus", "False Positive"), Ordering::Greater);
    }

    #[test]
    fn threat_mapping_matches_protocol() {
        assert_eq!(ThreatLevel::from(MessageType::SecurityHole), ThreatLevel::High);
        assert_eq!(ThreatLevel::from(MessageType::SecurityWarning), ThreatLevel::Medium);
        assert_eq!(ThreatLevel::from(MessageType::SecurityNote), ThreatLevel::Low);
        assert_eq!(ThreatLevel::from(MessageType::LogMessage), ThreatLevel::Log);
        assert_eq!(ThreatLevel::from(MessageType::DebugMessage), ThreatLevel::Debug);
        assert_eq!(
            ThreatLevel::from(MessageType::FalsePositive),
            ThreatLevel::FalsePositive
        );
    }

    #[test]
    fn round_trip_labels() {
        for label in MessageType::DESCENDING {
            assert_eq!(MessageType::parse(label.as_str()), Some(label));
            let threat = ThreatLevel::from(label);
            assert_eq!(ThreatLevel::parse(threat.as_str()), Some(threat));
        }
    }

    proptest! {
        #[test]
        fn collate_is_total_for_arbitrary_labels(a in ".{0,24}", b in ".{0,24}") {
            let forward = MessageType::collate(&a, &b);
            let backward = MessageType::collate(&b, &a);
            assert_eq!(forward, backward.reverse());
        }
    }
}
