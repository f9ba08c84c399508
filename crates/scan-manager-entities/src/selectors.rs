// crates/scan-manager-entities/src/selectors.rs
// ============================================================================
// Module: NVT Selector Engine
// Description: Set algebra over the NVT universe.
// Purpose: Answer growing/count queries for selectors and switch a config's
//          selector between its two canonical representations.
// Dependencies: crate::{access, configs, context, outcome}, rusqlite,
//               scan-manager-store
// ============================================================================

//! ## Overview
//! A selector is an ordered list of `(exclude, type, family_or_nvt,
//! family)` rules sharing one name. Two canonical representations exist:
//! constraining the universe (one include-everything rule plus family
//! excludes and cherry-picked NVT includes) and generating from empty
//! (family includes, NVT includes, and cherry-picked-out NVT excludes
//! inside included families). A family is growing when new checks loaded
//! into it join the selection automatically. Representation switching is a
//! deterministic rewrite that preserves the selected NVT set and runs in
//! one exclusive transaction together with the config cache update.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use rusqlite::params;
use scan_manager_store::StoreError;
use scan_manager_store::Tx;

use crate::access::visible_rid_by_uuid;
use crate::context::EntityError;
use crate::context::Manage;
use crate::outcome::ModifyOutcome;

// ============================================================================
// SECTION: Rule Model
// ============================================================================

/// Selector rule type: include/exclude everything.
pub const SELECTOR_TYPE_ALL: i64 = 0;
/// Selector rule type: one family.
pub const SELECTOR_TYPE_FAMILY: i64 = 1;
/// Selector rule type: one NVT.
pub const SELECTOR_TYPE_NVT: i64 = 2;

/// One selector rule row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorRule {
    /// Whether the rule removes from the selection.
    pub exclude: bool,
    /// Rule type: ALL, FAMILY, or NVT.
    pub rule_type: i64,
    /// Family name or NVT OID the rule names, per type.
    pub family_or_nvt: String,
    /// Family an NVT rule's check belongs to.
    pub family: String,
}

/// Reads all rules of a selector in row order.
pub(crate) fn rules(tx: &Tx<'_>, selector: &str) -> Result<Vec<SelectorRule>, StoreError> {
    tx.rows(
        "SELECT exclude, type, family_or_nvt, family FROM nvt_selectors
         WHERE name = ?1 ORDER BY rid",
        params![selector],
        |row| {
            Ok(SelectorRule {
                exclude: row.get::<_, i64>(0)? != 0,
                rule_type: row.get(1)?,
                family_or_nvt: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                family: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        },
    )
}

/// The NVT family universe: family name to check count, from the cache
/// relation.
fn universe(tx: &Tx<'_>) -> Result<BTreeMap<String, i64>, StoreError> {
    let rows = tx.rows(
        "SELECT family, count(*) FROM nvts
         WHERE family IS NOT NULL AND family != '' GROUP BY family",
        [],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
    )?;
    Ok(rows.into_iter().collect())
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Whether the family set grows automatically: an include-everything rule
/// exists.
pub(crate) fn families_growing(tx: &Tx<'_>, selector: &str) -> Result<bool, StoreError> {
    let hit = tx.opt_i64(
        "SELECT 1 FROM nvt_selectors
         WHERE name = ?1 AND type = 0 AND exclude = 0 LIMIT 1",
        params![selector],
    )?;
    Ok(hit.is_some())
}

/// Whether `family` is growing under `selector`: constrained selectors
/// grow every family they do not exclude; generated selectors grow only
/// explicitly included families.
pub(crate) fn family_growing(
    tx: &Tx<'_>,
    selector: &str,
    family: &str,
) -> Result<bool, StoreError> {
    if families_growing(tx, selector)? {
        let excluded = tx.opt_i64(
            "SELECT 1 FROM nvt_selectors
             WHERE name = ?1 AND type = 1 AND exclude = 1 AND family_or_nvt = ?2 LIMIT 1",
            params![selector, family],
        )?;
        Ok(excluded.is_none())
    } else {
        let included = tx.opt_i64(
            "SELECT 1 FROM nvt_selectors
             WHERE name = ?1 AND type = 1 AND exclude = 0 AND family_or_nvt = ?2 LIMIT 1",
            params![selector, family],
        )?;
        Ok(included.is_some())
    }
}

/// Number of families the selector selects.
pub(crate) fn family_count(tx: &Tx<'_>, selector: &str) -> Result<i64, StoreError> {
    if families_growing(tx, selector)? {
        let total = i64::try_from(universe(tx)?.len()).unwrap_or(i64::MAX);
        let excluded = tx.scalar_i64(
            "SELECT count(*) FROM nvt_selectors WHERE name = ?1 AND type = 1 AND exclude = 1",
            params![selector],
        )?;
        Ok((total - excluded).max(0))
    } else {
        let included = tx.scalar_i64(
            "SELECT count(*) FROM nvt_selectors WHERE name = ?1 AND type = 1 AND exclude = 0",
            params![selector],
        )?;
        let picked = tx.scalar_i64(
            "SELECT count(DISTINCT family) FROM nvt_selectors
             WHERE name = ?1 AND type = 2 AND exclude = 0
               AND family NOT IN (SELECT family_or_nvt FROM nvt_selectors
                                  WHERE name = ?1 AND type = 1 AND exclude = 0)",
            params![selector],
        )?;
        Ok(included + picked)
    }
}

/// Number of NVTs the selector selects inside one family. A growing family
/// counts its universe size minus cherry-picked-out checks; a static
/// family counts its cherry-picked-in checks.
pub(crate) fn nvt_count_in_family(
    tx: &Tx<'_>,
    selector: &str,
    family: &str,
) -> Result<i64, StoreError> {
    if family_growing(tx, selector, family)? {
        let total = tx.scalar_i64(
            "SELECT count(*) FROM nvts WHERE family = ?1",
            params![family],
        )?;
        let excluded = tx.scalar_i64(
            "SELECT count(*) FROM nvt_selectors
             WHERE name = ?1 AND type = 2 AND exclude = 1 AND family = ?2",
            params![selector, family],
        )?;
        Ok((total - excluded).max(0))
    } else {
        tx.scalar_i64(
            "SELECT count(*) FROM nvt_selectors
             WHERE name = ?1 AND type = 2 AND exclude = 0 AND family = ?2",
            params![selector, family],
        )
    }
}

/// Total selected NVT count: growing families contribute their remainder,
/// static families their cherry-picked checks.
pub(crate) fn selected_nvt_count(tx: &Tx<'_>, selector: &str) -> Result<i64, StoreError> {
    let mut total = 0;
    let mut growing_families = BTreeSet::new();
    for (family, _) in universe(tx)? {
        if family_growing(tx, selector, &family)? {
            growing_families.insert(family.clone());
            total += nvt_count_in_family(tx, selector, &family)?;
        }
    }
    let rule_list = rules(tx, selector)?;
    for rule in rule_list {
        if rule.rule_type == SELECTOR_TYPE_NVT
            && !rule.exclude
            && !growing_families.contains(&rule.family)
        {
            total += 1;
        }
    }
    Ok(total)
}

// ============================================================================
// SECTION: Config Cache
// ============================================================================

/// Recomputes one config's cached counts and growing flags from its
/// selector. Must run inside every transaction that mutates the selector
/// or the NVT universe.
pub(crate) fn refresh_config_cache(tx: &Tx<'_>, config_rid: i64) -> Result<(), StoreError> {
    let selector = tx.scalar_string(
        "SELECT nvt_selector FROM configs WHERE rid = ?1",
        params![config_rid],
    )?;
    let growing = families_growing(tx, &selector)?;
    let families = family_count(tx, &selector)?;
    let nvt_total = selected_nvt_count(tx, &selector)?;
    tx.exec(
        "UPDATE configs SET family_count = ?1, nvt_count = ?2,
                            families_growing = ?3, nvts_growing = ?3
         WHERE rid = ?4",
        params![families, nvt_total, i64::from(growing), config_rid],
    )?;
    Ok(())
}

/// Recomputes every config's cache. Runs after an NVT feed reload.
pub(crate) fn refresh_all_config_caches(tx: &Tx<'_>) -> Result<(), StoreError> {
    let config_rids = tx.rows("SELECT rid FROM configs", [], |row| row.get::<_, i64>(0))?;
    for rid in config_rids {
        refresh_config_cache(tx, rid)?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Representation Switch
// ============================================================================

/// Computes the rewritten rule list for the target representation,
/// preserving the selected NVT set.
fn rewrite_rules(
    current: &[SelectorRule],
    universe: &BTreeMap<String, i64>,
    growing_families: &BTreeSet<String>,
    make_growing: bool,
) -> Vec<SelectorRule> {
    let mut out = Vec::new();
    if make_growing {
        // Constrain the universe: exclude non-growing families, keep
        // cherry-picks on both sides.
        out.push(SelectorRule {
            exclude: false,
            rule_type: SELECTOR_TYPE_ALL,
            family_or_nvt: String::new(),
            family: String::new(),
        });
        for family in universe.keys() {
            if !growing_families.contains(family) {
                out.push(SelectorRule {
                    exclude: true,
                    rule_type: SELECTOR_TYPE_FAMILY,
                    family_or_nvt: family.clone(),
                    family: String::new(),
                });
            }
        }
        for rule in current {
            if rule.rule_type != SELECTOR_TYPE_NVT {
                continue;
            }
            let in_growing = growing_families.contains(&rule.family);
            if rule.exclude && in_growing {
                out.push(rule.clone());
            } else if !rule.exclude && !in_growing {
                out.push(rule.clone());
            }
        }
    } else {
        // Generate from empty: include the growing families explicitly.
        for family in growing_families {
            out.push(SelectorRule {
                exclude: false,
                rule_type: SELECTOR_TYPE_FAMILY,
                family_or_nvt: family.clone(),
                family: String::new(),
            });
        }
        for rule in current {
            if rule.rule_type != SELECTOR_TYPE_NVT {
                continue;
            }
            let in_growing = growing_families.contains(&rule.family);
            if rule.exclude && in_growing {
                out.push(rule.clone());
            } else if !rule.exclude && !in_growing {
                out.push(rule.clone());
            }
        }
    }
    out
}

impl Manage {
    /// Switches a config's selector between the constrained (growing) and
    /// generated (static) representations. The rewrite is deterministic,
    /// preserves the selected NVT set, and updates the config's cached
    /// counts and growing flags in the same exclusive transaction.
    ///
    /// Predefined configs and configs sharing a selector with another
    /// config are refused as busy.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn switch_config_representation(
        &mut self,
        config_uuid: &str,
        make_growing: bool,
    ) -> Result<ModifyOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(config_rid) = visible_rid_by_uuid(tx, "configs", config_uuid, user_rid)?
            else {
                return Ok(ModifyOutcome::Missing);
            };
            if (1 ..= 4).contains(&config_rid) {
                return Ok(ModifyOutcome::Busy);
            }
            let selector = tx.scalar_string(
                "SELECT nvt_selector FROM configs WHERE rid = ?1",
                params![config_rid],
            )?;
            let shared = tx.scalar_i64(
                "SELECT count(*) FROM configs WHERE nvt_selector = ?1",
                params![selector],
            )?;
            if shared > 1 {
                return Ok(ModifyOutcome::Busy);
            }
            if families_growing(tx, &selector)? == make_growing {
                return Ok(ModifyOutcome::Modified);
            }
            let current = rules(tx, &selector)?;
            let all_families = universe(tx)?;
            let mut growing_families = BTreeSet::new();
            for family in all_families.keys() {
                if family_growing(tx, &selector, family)? {
                    growing_families.insert(family.clone());
                }
            }
            let rewritten =
                rewrite_rules(&current, &all_families, &growing_families, make_growing);
            tx.exec("DELETE FROM nvt_selectors WHERE name = ?1", params![selector])?;
            for rule in rewritten {
                tx.exec(
                    "INSERT INTO nvt_selectors (name, exclude, type, family_or_nvt, family)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        selector,
                        i64::from(rule.exclude),
                        rule.rule_type,
                        rule.family_or_nvt,
                        rule.family
                    ],
                )?;
            }
            refresh_config_cache(tx, config_rid)?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use rusqlite::params;
    use scan_manager_store::StoreError;

    use super::family_count;
    use super::family_growing;
    use super::nvt_count_in_family;
    use super::selected_nvt_count;
    use crate::nvts::Nvt;
    use crate::tests_support::initialized_manage;

    /// Ten checks in "Port scanners", five in "Web Servers".
    fn seed_universe(manage: &mut crate::context::Manage) {
        let mut feed = Vec::new();
        for index in 0 .. 10 {
            feed.push(Nvt {
                oid: format!("1.3.6.1.4.1.25623.1.0.10031{index}"),
                family: "Port scanners".to_string(),
                ..Nvt::default()
            });
        }
        for index in 0 .. 5 {
            feed.push(Nvt {
                oid: format!("1.3.6.1.4.1.25623.1.0.2000{index}"),
                family: "Web Servers".to_string(),
                ..Nvt::default()
            });
        }
        manage.refresh_nvts(feed, "seed").unwrap();
    }

    /// Installs selector rules for a generated-from-empty selector
    /// with one family include subsuming a single NVT include.
    fn seed_static_selector(manage: &mut crate::context::Manage, name: &str) {
        manage
            .store()
            .exclusive(|tx| -> Result<(), StoreError> {
                tx.exec(
                    "INSERT INTO nvt_selectors (name, exclude, type, family_or_nvt, family)
                     VALUES (?1, 0, 1, 'Port scanners', '')",
                    params![name],
                )?;
                tx.exec(
                    "INSERT INTO nvt_selectors (name, exclude, type, family_or_nvt, family)
                     VALUES (?1, 0, 2, '1.3.6.1.4.1.25623.1.0.100315', 'Port scanners')",
                    params![name],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn family_include_subsumes_nvt_include() {
        let mut manage = initialized_manage();
        seed_universe(&mut manage);
        seed_static_selector(&mut manage, "sel-static");
        manage
            .store()
            .immediate(|tx| -> Result<(), StoreError> {
                assert_eq!(family_count(tx, "sel-static")?, 1);
                assert_eq!(nvt_count_in_family(tx, "sel-static", "Port scanners")?, 10);
                assert_eq!(selected_nvt_count(tx, "sel-static")?, 10);
                assert!(family_growing(tx, "sel-static", "Port scanners")?);
                assert!(!family_growing(tx, "sel-static", "Web Servers")?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn growing_selector_counts_the_whole_universe() {
        let mut manage = initialized_manage();
        seed_universe(&mut manage);
        manage
            .store()
            .immediate(|tx| -> Result<(), StoreError> {
                // The predefined "all" selector has a single ALL-include rule.
                let all = "54b45713-d4f4-4435-b20d-304c175ed8c5";
                assert_eq!(family_count(tx, all)?, 2);
                assert_eq!(selected_nvt_count(tx, all)?, 15);
                assert!(family_growing(tx, all, "Web Servers")?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn family_exclude_shrinks_a_growing_selector() {
        let mut manage = initialized_manage();
        seed_universe(&mut manage);
        manage
            .store()
            .exclusive(|tx| -> Result<(), StoreError> {
                tx.exec(
                    "INSERT INTO nvt_selectors (name, exclude, type, family_or_nvt, family)
                     VALUES ('sel-constrained', 0, 0, NULL, NULL)",
                    [],
                )?;
                tx.exec(
                    "INSERT INTO nvt_selectors (name, exclude, type, family_or_nvt, family)
                     VALUES ('sel-constrained', 1, 1, 'Web Servers', '')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        manage
            .store()
            .immediate(|tx| -> Result<(), StoreError> {
                assert_eq!(family_count(tx, "sel-constrained")?, 1);
                assert_eq!(selected_nvt_count(tx, "sel-constrained")?, 10);
                assert!(!family_growing(tx, "sel-constrained", "Web Servers")?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn representation_switch_preserves_the_selected_set() {
        let mut manage = initialized_manage();
        seed_universe(&mut manage);
        seed_static_selector(&mut manage, "085569ce-73ed-11df-83c3-002264764cea");
        // Wire the "empty" config (which owns that selector uuid) through
        // a growing switch and back.
        let empty = "085569ce-73ed-11df-83c3-002264764cea";
        let before = manage
            .store()
            .immediate(|tx| selected_nvt_count(tx, empty))
            .unwrap();
        manage.switch_config_representation(empty, true).unwrap();
        let growing = manage
            .store()
            .immediate(|tx| selected_nvt_count(tx, empty))
            .unwrap();
        manage.switch_config_representation(empty, false).unwrap();
        let after = manage
            .store()
            .immediate(|tx| selected_nvt_count(tx, empty))
            .unwrap();
        assert_eq!(before, growing);
        assert_eq!(before, after);
    }

    #[test]
    fn predefined_configs_refuse_representation_switch() {
        let mut manage = initialized_manage();
        let outcome = manage
            .switch_config_representation("daba56c8-73ec-11df-a475-002264764cea", false)
            .unwrap();
        assert_eq!(outcome, crate::outcome::ModifyOutcome::Busy);
    }
}
