// crates/scan-manager-entities/src/nvts.rs
// ============================================================================
// Module: NVT Cache
// Description: The in-memory NVT snapshot and its store-backed rebuild.
// Purpose: Give readers a consistent view of the NVT universe while the
//          scanner feed is reloaded under an exclusive transaction.
// Dependencies: crate::context, rusqlite, scan-manager-store
// ============================================================================

//! ## Overview
//! The `nvts` relation is populated by the scanner through the external
//! protocol collaborator and is read-only from every other path. When the
//! scanner reports a checksum change, the cache is rebuilt inside one
//! exclusive transaction and the in-memory snapshot is swapped atomically;
//! readers holding the old snapshot keep a consistent view until they drop
//! it. Canonical per-NVT preference defaults live in `nvt_preferences`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use rusqlite::params;

use crate::context::EntityError;
use crate::context::Manage;

// ============================================================================
// SECTION: Cache Rows
// ============================================================================

/// One cached NVT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nvt {
    /// OID identifying the check.
    pub oid: String,
    /// Feed version of the check.
    pub version: String,
    /// Display name.
    pub name: String,
    /// Summary line.
    pub summary: String,
    /// Long description.
    pub description: String,
    /// Copyright line.
    pub copyright: String,
    /// Comma-separated CVE references.
    pub cve: String,
    /// Comma-separated BID references.
    pub bid: String,
    /// Comma-separated cross references.
    pub xref: String,
    /// Raw tag string.
    pub tag: String,
    /// Feed signing key ids.
    pub sign_key_ids: String,
    /// Scanner category.
    pub category: i64,
    /// Family the check belongs to.
    pub family: String,
    /// CVSS base score, textual.
    pub cvss_base: String,
    /// Risk factor label.
    pub risk_factor: String,
}

/// Immutable snapshot of the NVT universe.
#[derive(Debug, Default)]
pub struct NvtSnapshot {
    /// Checks keyed by OID.
    by_oid: BTreeMap<String, Nvt>,
    /// Per-family check counts.
    families: BTreeMap<String, i64>,
    /// Feed checksum the snapshot was built from.
    checksum: String,
}

impl NvtSnapshot {
    /// Builds a snapshot from cache rows.
    #[must_use]
    pub fn from_rows(rows: Vec<Nvt>, checksum: String) -> Self {
        let mut by_oid = BTreeMap::new();
        let mut families = BTreeMap::new();
        for nvt in rows {
            if !nvt.family.is_empty() {
                *families.entry(nvt.family.clone()).or_insert(0) += 1;
            }
            by_oid.insert(nvt.oid.clone(), nvt);
        }
        Self {
            by_oid,
            families,
            checksum,
        }
    }

    /// Looks up a check by OID.
    #[must_use]
    pub fn nvt(&self, oid: &str) -> Option<&Nvt> {
        self.by_oid.get(oid)
    }

    /// Total number of cached checks.
    #[must_use]
    pub fn nvt_count(&self) -> usize {
        self.by_oid.len()
    }

    /// Number of distinct families.
    #[must_use]
    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    /// Number of checks in one family.
    #[must_use]
    pub fn family_nvt_count(&self, family: &str) -> i64 {
        self.families.get(family).copied().unwrap_or(0)
    }

    /// Iterates family names with their counts.
    pub fn families(&self) -> impl Iterator<Item = (&str, i64)> {
        self.families.iter().map(|(name, count)| (name.as_str(), *count))
    }

    /// Checksum of the feed this snapshot reflects.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl Manage {
    /// Replaces the NVT cache with a fresh scanner feed. The relation is
    /// rebuilt inside one exclusive transaction, the feed checksum is
    /// recorded, and the in-memory snapshot is swapped afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn refresh_nvts(
        &mut self,
        feed: Vec<Nvt>,
        checksum: &str,
    ) -> Result<(), EntityError> {
        self.store().exclusive(|tx| {
            tx.exec("DELETE FROM nvts", [])?;
            for nvt in &feed {
                tx.exec(
                    "INSERT INTO nvts (oid, version, name, summary, description, copyright,
                                       cve, bid, xref, tag, sign_key_ids, category, family,
                                       cvss_base, risk_factor)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                             ?14, ?15)",
                    params![
                        nvt.oid,
                        nvt.version,
                        nvt.name,
                        nvt.summary,
                        nvt.description,
                        nvt.copyright,
                        nvt.cve,
                        nvt.bid,
                        nvt.xref,
                        nvt.tag,
                        nvt.sign_key_ids,
                        nvt.category,
                        nvt.family,
                        nvt.cvss_base,
                        nvt.risk_factor
                    ],
                )?;
            }
            tx.exec(
                "INSERT INTO meta (name, value) VALUES ('nvts_checksum', ?1)
                 ON CONFLICT (name) DO UPDATE SET value = ?1",
                params![checksum],
            )?;
            // The universe changed; every growing config's cached counts
            // must agree again before this transaction commits.
            crate::selectors::refresh_all_config_caches(tx)?;
            Ok::<_, EntityError>(())
        })?;
        self.swap_nvt_snapshot(NvtSnapshot::from_rows(feed, checksum.to_string()));
        Ok(())
    }

    /// Rebuilds the in-memory snapshot from the relation. Called at
    /// startup before any snapshot reader runs.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn reload_nvt_snapshot(&mut self) -> Result<(), EntityError> {
        let (rows, checksum) = self.store().immediate(|tx| {
            let rows = tx.rows(
                "SELECT oid, version, name, summary, description, copyright, cve, bid,
                        xref, tag, sign_key_ids, category, family, cvss_base, risk_factor
                 FROM nvts",
                [],
                |row| {
                    Ok(Nvt {
                        oid: row.get(0)?,
                        version: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        summary: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        description: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        copyright: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                        cve: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                        bid: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
                        xref: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                        tag: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                        sign_key_ids: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
                        category: row.get::<_, Option<i64>>(11)?.unwrap_or_default(),
                        family: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
                        cvss_base: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
                        risk_factor: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
                    })
                },
            )?;
            let checksum = tx
                .opt_string("SELECT value FROM meta WHERE name = 'nvts_checksum'", [])?
                .unwrap_or_default();
            Ok::<_, EntityError>((rows, checksum))
        })?;
        self.swap_nvt_snapshot(NvtSnapshot::from_rows(rows, checksum));
        Ok(())
    }

    /// Sets one canonical per-NVT preference default.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn set_nvt_preference(&mut self, name: &str, value: &str) -> Result<(), EntityError> {
        self.store().exclusive(|tx| {
            tx.exec(
                "INSERT INTO nvt_preferences (name, value) VALUES (?1, ?2)
                 ON CONFLICT (name) DO UPDATE SET value = ?2",
                params![name, value],
            )?;
            Ok::<_, EntityError>(())
        })
    }

    /// Reads one canonical per-NVT preference default.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn nvt_preference(&mut self, name: &str) -> Result<Option<String>, EntityError> {
        Ok(self.store().immediate(|tx| {
            tx.opt_string("SELECT value FROM nvt_preferences WHERE name = ?1", params![name])
        })?)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::Nvt;
    use crate::tests_support::initialized_manage;

    fn port_scanner(oid: &str) -> Nvt {
        Nvt {
            oid: oid.to_string(),
            name: format!("Scanner {oid}"),
            family: "Port scanners".to_string(),
            ..Nvt::default()
        }
    }

    #[test]
    fn refresh_swaps_the_snapshot_atomically() {
        let mut manage = initialized_manage();
        let before = manage.nvt_snapshot();
        manage
            .refresh_nvts(
                vec![port_scanner("1.3.6.1.4.1.25623.1.0.100315"), port_scanner("1.3.6.1.4.1.25623.1.0.14259")],
                "c1",
            )
            .unwrap();
        let after = manage.nvt_snapshot();
        assert_eq!(before.nvt_count(), 0);
        assert_eq!(after.nvt_count(), 2);
        assert_eq!(after.family_nvt_count("Port scanners"), 2);
        assert_eq!(after.checksum(), "c1");
    }

    #[test]
    fn reload_matches_the_relation() {
        let mut manage = initialized_manage();
        manage.refresh_nvts(vec![port_scanner("1.3.6.1.4.1.25623.1.0.14259")], "c2").unwrap();
        manage.swap_nvt_snapshot(super::NvtSnapshot::default());
        manage.reload_nvt_snapshot().unwrap();
        let snapshot = manage.nvt_snapshot();
        assert_eq!(snapshot.nvt_count(), 1);
        assert!(snapshot.nvt("1.3.6.1.4.1.25623.1.0.14259").is_some());
    }

    #[test]
    fn preference_defaults_round_trip() {
        let mut manage = initialized_manage();
        manage.set_nvt_preference("Ping Host[checkbox]:Do a TCP ping", "no").unwrap();
        assert_eq!(
            manage.nvt_preference("Ping Host[checkbox]:Do a TCP ping").unwrap().as_deref(),
            Some("no")
        );
        assert_eq!(manage.nvt_preference("absent").unwrap(), None);
    }
}
