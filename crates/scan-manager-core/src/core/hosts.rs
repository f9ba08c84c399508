// crates/scan-manager-core/src/core/hosts.rs
// ============================================================================
// Module: Host List Expressions
// Description: Parsing and counting of target host specifications.
// Purpose: Validate the comma-separated hosts column and bound scan size.
// Dependencies: std::net
// ============================================================================

//! ## Overview
//! A target's `hosts` column is a comma-separated list of host
//! specifications: a single IPv4 address, CIDR block, netmask pair, short or
//! long octet range, a single IPv6 address, or a hostname. Validation
//! produces the host count used to enforce the scan-size bound; membership
//! checks stay literal (the scanner reports back the exact list entries).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::Ipv4Addr;
use std::net::Ipv6Addr;

use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum number of hosts a single target may expand to.
pub const MAX_HOSTS: u64 = 4095;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Host list validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostsError {
    /// A list entry did not parse as any accepted specification.
    #[error("invalid host specification: {0}")]
    Invalid(String),
    /// The list expands past [`MAX_HOSTS`].
    #[error("host list expands to {count} hosts (max {max})")]
    TooMany {
        /// Number of hosts the list expands to.
        count: u64,
        /// The configured bound.
        max: u64,
    },
}

// ============================================================================
// SECTION: Host Specifications
// ============================================================================

/// One parsed entry of a target host list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSpec {
    /// Single IPv4 address.
    Single(Ipv4Addr),
    /// CIDR block `a.b.c.d/N`.
    Cidr(Ipv4Addr, u8),
    /// Short range `a.b.c.d-e`: the last octet runs from `d` to `e`.
    ShortRange(Ipv4Addr, u8),
    /// Long range `a.b.c.d-a.b.c.e` over the full address space.
    LongRange(Ipv4Addr, Ipv4Addr),
    /// Single IPv6 address.
    Ipv6(Ipv6Addr),
    /// Hostname to be resolved by the scanner.
    Name(String),
}

impl HostSpec {
    /// Parses one trimmed list entry.
    #[must_use]
    pub fn parse(entry: &str) -> Option<Self> {
        if entry.is_empty() {
            return None;
        }
        if let Ok(address) = entry.parse::<Ipv4Addr>() {
            return Some(Self::Single(address));
        }
        if let Ok(address) = entry.parse::<Ipv6Addr>() {
            return Some(Self::Ipv6(address));
        }
        if let Some((base, tail)) = entry.split_once('/') {
            return parse_block(base, tail);
        }
        if let Some((start, tail)) = entry.split_once('-') {
            return parse_range(start, tail);
        }
        parse_name(entry)
    }

    /// Number of addresses this entry expands to.
    ///
    /// CIDR blocks narrower than /31 exclude the network and broadcast
    /// addresses, matching what the scanner enumerates.
    #[must_use]
    pub fn count(&self) -> u64 {
        match self {
            Self::Single(_) | Self::Ipv6(_) | Self::Name(_) => 1,
            Self::Cidr(_, prefix) => {
                let span = 1_u64 << (32 - u32::from(*prefix));
                if *prefix >= 31 { span } else { span.saturating_sub(2) }
            }
            Self::ShortRange(start, end) => {
                u64::from(*end) - u64::from(start.octets()[3]) + 1
            }
            Self::LongRange(start, end) => {
                u64::from(u32::from(*end)) - u64::from(u32::from(*start)) + 1
            }
        }
    }
}

/// Parses the `/`-suffixed forms: CIDR prefix or dotted netmask.
fn parse_block(base: &str, tail: &str) -> Option<HostSpec> {
    let address = base.parse::<Ipv4Addr>().ok()?;
    if let Ok(prefix) = tail.parse::<u8>() {
        if prefix == 0 || prefix > 32 {
            return None;
        }
        return Some(HostSpec::Cidr(address, prefix));
    }
    let mask = tail.parse::<Ipv4Addr>().ok()?;
    let bits = u32::from(mask);
    // A valid netmask is a contiguous run of ones from the top.
    if bits == 0 || bits.leading_ones() + bits.trailing_zeros() != 32 {
        return None;
    }
    let prefix = bits.leading_ones();
    Some(HostSpec::Cidr(address, u8::try_from(prefix).ok()?))
}

/// Parses the `-`-suffixed range forms.
fn parse_range(start: &str, tail: &str) -> Option<HostSpec> {
    let first = start.parse::<Ipv4Addr>().ok()?;
    if let Ok(last_octet) = tail.parse::<u8>() {
        if last_octet < first.octets()[3] {
            return None;
        }
        return Some(HostSpec::ShortRange(first, last_octet));
    }
    let last = tail.parse::<Ipv4Addr>().ok()?;
    if u32::from(last) < u32::from(first) {
        return None;
    }
    Some(HostSpec::LongRange(first, last))
}

/// Parses a hostname entry: letters, digits, dots, dashes; must contain a
/// letter and must not begin or end with a dash or dot.
fn parse_name(entry: &str) -> Option<HostSpec> {
    let valid_chars =
        entry.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    let has_letter = entry.chars().any(|c| c.is_ascii_alphabetic());
    let clean_edges = !entry.starts_with(['-', '.']) && !entry.ends_with(['-', '.']);
    if valid_chars && has_letter && clean_edges {
        Some(HostSpec::Name(entry.to_string()))
    } else {
        None
    }
}

// ============================================================================
// SECTION: List Operations
// ============================================================================

/// Parses a full comma-separated host list. Entries are trimmed; an empty
/// list or any unparseable entry is an error.
///
/// # Errors
///
/// Returns [`HostsError::Invalid`] naming the first bad entry.
pub fn parse_host_list(hosts: &str) -> Result<Vec<HostSpec>, HostsError> {
    let mut specs = Vec::new();
    for raw in hosts.split(',') {
        let entry = raw.trim();
        let spec =
            HostSpec::parse(entry).ok_or_else(|| HostsError::Invalid(entry.to_string()))?;
        specs.push(spec);
    }
    if specs.is_empty() {
        return Err(HostsError::Invalid(String::new()));
    }
    Ok(specs)
}

/// Validates a host list and returns its expansion count.
///
/// # Errors
///
/// Returns [`HostsError::Invalid`] for a malformed entry and
/// [`HostsError::TooMany`] when the expansion passes [`MAX_HOSTS`].
pub fn count_hosts(hosts: &str) -> Result<u64, HostsError> {
    let specs = parse_host_list(hosts)?;
    let count = specs.iter().map(HostSpec::count).sum();
    if count > MAX_HOSTS {
        return Err(HostsError::TooMany {
            count,
            max: MAX_HOSTS,
        });
    }
    Ok(count)
}

/// Literal membership test: whether `host` appears as an entry of the
/// comma-separated `hosts` list after trimming. This is the semantics of the
/// `hosts_contains` SQL function and of note/override host scoping.
#[must_use]
pub fn hosts_contains(hosts: &str, host: &str) -> bool {
    hosts.split(',').any(|entry| entry.trim() == host.trim())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::HostSpec;
    use super::HostsError;
    use super::count_hosts;
    use super::hosts_contains;
    use super::parse_host_list;

    #[test]
    fn accepts_every_documented_form() {
        let list = "192.168.1.1, 10.0.0.0/24, 10.0.0.0/255.255.255.0, \
                    172.16.0.1-20, 172.16.0.1-172.16.0.40, ::1, scanner.example.com";
        let specs = parse_host_list(list).unwrap();
        assert_eq!(specs.len(), 7);
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(matches!(parse_host_list("10.0.0.0/0"), Err(HostsError::Invalid(_))));
        assert!(matches!(parse_host_list("10.0.0.0/33"), Err(HostsError::Invalid(_))));
        assert!(matches!(parse_host_list("10.0.0.9-3"), Err(HostsError::Invalid(_))));
        assert!(matches!(parse_host_list("-bad.example"), Err(HostsError::Invalid(_))));
        assert!(matches!(parse_host_list(""), Err(HostsError::Invalid(_))));
        assert!(matches!(
            parse_host_list("10.0.0.0/255.255.0.255"),
            Err(HostsError::Invalid(_))
        ));
    }

    #[test]
    fn counts_exclude_network_and_broadcast() {
        assert_eq!(HostSpec::parse("10.0.0.0/24").unwrap().count(), 254);
        assert_eq!(HostSpec::parse("10.0.0.0/31").unwrap().count(), 2);
        assert_eq!(HostSpec::parse("10.0.0.1/32").unwrap().count(), 1);
        assert_eq!(HostSpec::parse("10.0.0.5-9").unwrap().count(), 5);
        assert_eq!(HostSpec::parse("10.0.0.250-10.0.1.5").unwrap().count(), 12);
    }

    #[test]
    fn enforces_the_host_bound() {
        assert_eq!(count_hosts("10.0.0.0/21").unwrap(), 2046);
        assert!(matches!(
            count_hosts("10.0.0.0/19"),
            Err(HostsError::TooMany {
                count: 8190,
                ..
            })
        ));
    }

    #[test]
    fn membership_is_literal() {
        let hosts = "192.168.1.10, 192.168.1.0/24";
        assert!(hosts_contains(hosts, "192.168.1.10"));
        assert!(hosts_contains(hosts, "192.168.1.0/24"));
        assert!(!hosts_contains(hosts, "192.168.1.11"));
    }
}
