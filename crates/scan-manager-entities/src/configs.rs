// crates/scan-manager-entities/src/configs.rs
// ============================================================================
// Module: Config Repository
// Description: Accessors for scan configurations and their preferences.
// Purpose: Clone configs from templates, maintain cached selector counts,
//          and resolve effective preferences for scan dispatch.
// Dependencies: crate::{access, context, outcome, selectors}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! A config names an NVT selector plus preference rows. Creation clones a
//! base config (the "empty" template by default): selector rules are
//! copied under a selector named by the new config's uuid, preferences are
//! copied verbatim, and the cached counts are recomputed in the same
//! transaction. The effective value of an NVT preference is the config's
//! row when present, else the canonical `nvt_preferences` default.
//! Scanner-side iteration excludes the handful of fixed scanner-internal
//! names.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::EntityUuid;

use crate::access::name_taken;
use crate::access::visible_count;
use crate::access::visible_rid_by_uuid;
use crate::context::EntityError;
use crate::context::Manage;
use crate::outcome::CreateOutcome;
use crate::outcome::DeleteOutcome;
use crate::outcome::ModifyOutcome;
use crate::selectors::refresh_config_cache;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Uuid of the "empty" template used as the default clone base.
const EMPTY_CONFIG_UUID: &str = "085569ce-73ed-11df-83c3-002264764cea";

/// Scanner-internal preference names excluded from scanner-side iteration.
const EXCLUDED_SCANNER_PREFS: [&str; 4] =
    ["cache_folder", "include_folders", "nasl_no_signature_check", "ntp_save_sessions"];

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One config row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for predefined configs.
    pub owner: Option<i64>,
    /// Display name.
    pub name: String,
    /// Name of the owning NVT selector.
    pub nvt_selector: String,
    /// Free-form comment.
    pub comment: String,
    /// Cached family count.
    pub family_count: i64,
    /// Cached NVT count.
    pub nvt_count: i64,
    /// Whether the family set grows with the feed.
    pub families_growing: bool,
    /// Whether the NVT set grows with the feed.
    pub nvts_growing: bool,
}

/// Fields for a config create.
#[derive(Debug, Clone, Default)]
pub struct NewConfig {
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Uuid of the config to clone; the "empty" template when absent.
    pub base: Option<String>,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Maps one row of the standard config projection.
fn config_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Config> {
    Ok(Config {
        rid: row.get(0)?,
        uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
        owner: row.get(2)?,
        name: row.get(3)?,
        nvt_selector: row.get(4)?,
        comment: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        family_count: row.get(6)?,
        nvt_count: row.get(7)?,
        families_growing: row.get::<_, i64>(8)? != 0,
        nvts_growing: row.get::<_, i64>(9)? != 0,
    })
}

/// Standard projection shared by the read paths.
const CONFIG_COLUMNS: &str = "rid, uuid, owner, name, nvt_selector, comment, family_count, \
                              nvt_count, families_growing, nvts_growing";

impl Manage {
    /// Creates a config by cloning a base config's selector rules and
    /// preferences. The new selector is named by the new config's uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_config(&mut self, new: &NewConfig) -> Result<CreateOutcome, EntityError> {
        let user_rid = self.user_rid();
        let uuid = EntityUuid::generate();
        let base_uuid = new.base.clone().unwrap_or_else(|| EMPTY_CONFIG_UUID.to_string());
        self.store().exclusive(|tx| {
            if name_taken(tx, "configs", &new.name, user_rid)? {
                return Ok(CreateOutcome::Exists);
            }
            let Some(base_rid) = visible_rid_by_uuid(tx, "configs", &base_uuid, user_rid)?
            else {
                return Ok(CreateOutcome::MissingReference);
            };
            let base_selector = tx.scalar_string(
                "SELECT nvt_selector FROM configs WHERE rid = ?1",
                params![base_rid],
            )?;
            tx.exec(
                "INSERT INTO configs (uuid, owner, name, nvt_selector, comment,
                                      family_count, nvt_count, families_growing,
                                      nvts_growing)
                 VALUES (?1, ?2, ?3, ?1, ?4, 0, 0, 0, 0)",
                params![uuid.as_str(), user_rid, new.name, new.comment],
            )?;
            let config_rid = tx.last_insert_rid();
            tx.exec(
                "INSERT INTO nvt_selectors (name, exclude, type, family_or_nvt, family)
                 SELECT ?1, exclude, type, family_or_nvt, family
                 FROM nvt_selectors WHERE name = ?2 ORDER BY rid",
                params![uuid.as_str(), base_selector],
            )?;
            tx.exec(
                "INSERT INTO config_preferences (config, type, name, value)
                 SELECT ?1, type, name, value FROM config_preferences WHERE config = ?2",
                params![config_rid, base_rid],
            )?;
            refresh_config_cache(tx, config_rid)?;
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible config by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_config_by_uuid(&mut self, uuid: &str) -> Result<Option<Config>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "configs", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                &format!("SELECT {CONFIG_COLUMNS} FROM configs WHERE rid = ?1"),
                params![rid],
                config_from_row,
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Iterates configs visible to the session, in rid order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_configs(&mut self) -> Result<Vec<Config>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| match user_rid {
            Some(rid) => tx.rows(
                &format!(
                    "SELECT {CONFIG_COLUMNS} FROM configs
                     WHERE owner IS NULL OR owner = ?1 ORDER BY rid"
                ),
                params![rid],
                config_from_row,
            ),
            None => tx.rows(
                &format!(
                    "SELECT {CONFIG_COLUMNS} FROM configs WHERE owner IS NULL ORDER BY rid"
                ),
                [],
                config_from_row,
            ),
        })?)
    }

    /// Counts configs visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_configs(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| visible_count(tx, "configs", user_rid))?)
    }

    /// Renames a config. Predefined configs refuse modification.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn modify_config(
        &mut self,
        uuid: &str,
        name: &str,
        comment: &str,
    ) -> Result<ModifyOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "configs", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            if (1 ..= 4).contains(&rid) {
                return Ok(ModifyOutcome::Busy);
            }
            let current_name =
                tx.scalar_string("SELECT name FROM configs WHERE rid = ?1", params![rid])?;
            if current_name != name && name_taken(tx, "configs", name, user_rid)? {
                return Ok(ModifyOutcome::Exists);
            }
            tx.exec(
                "UPDATE configs SET name = ?1, comment = ?2 WHERE rid = ?3",
                params![name, comment, rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Sets one preference row on a config. A config referenced by any
    /// task refuses preference changes.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn set_config_preference(
        &mut self,
        uuid: &str,
        pref_type: Option<&str>,
        name: &str,
        value: &str,
    ) -> Result<ModifyOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "configs", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            let used =
                tx.opt_i64("SELECT 1 FROM tasks WHERE config = ?1 LIMIT 1", params![rid])?;
            if used.is_some() {
                return Ok(ModifyOutcome::Busy);
            }
            let updated = tx.exec(
                "UPDATE config_preferences SET value = ?1
                 WHERE config = ?2 AND name = ?3",
                params![value, rid, name],
            )?;
            if updated == 0 {
                tx.exec(
                    "INSERT INTO config_preferences (config, type, name, value)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![rid, pref_type, name, value],
                )?;
            }
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Effective value of an NVT preference: the config's row when
    /// present, else the canonical default.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn config_effective_preference(
        &mut self,
        uuid: &str,
        name: &str,
    ) -> Result<Option<String>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "configs", uuid, user_rid)? else {
                return Ok(None);
            };
            if let Some(value) = tx.opt_string(
                "SELECT value FROM config_preferences WHERE config = ?1 AND name = ?2",
                params![rid, name],
            )? {
                return Ok(Some(value));
            }
            tx.opt_string("SELECT value FROM nvt_preferences WHERE name = ?1", params![name])
        })?)
    }

    /// Effective per-NVT preferences for scan dispatch: every canonical
    /// default, overlaid with the config's own rows.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn config_nvt_preferences(
        &mut self,
        uuid: &str,
    ) -> Result<Vec<(String, String)>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "configs", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT nvt_preferences.name,
                        coalesce(config_preferences.value, nvt_preferences.value)
                 FROM nvt_preferences
                 LEFT JOIN config_preferences
                   ON config_preferences.config = ?1
                  AND config_preferences.name = nvt_preferences.name
                 ORDER BY nvt_preferences.name",
                params![rid],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    ))
                },
            )
        })?)
    }

    /// Scanner-side preferences for dispatch, with the scanner-internal
    /// names and `server_info_*` excluded from iteration.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn config_scanner_preferences(
        &mut self,
        uuid: &str,
    ) -> Result<Vec<(String, String)>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "configs", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT name, value FROM config_preferences
                 WHERE config = ?1 AND type = 'SERVER_PREFS' ORDER BY name",
                params![rid],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    ))
                },
            )
        })?;
        Ok(rows
            .into_iter()
            .filter(|(name, _)| {
                !EXCLUDED_SCANNER_PREFS.contains(&name.as_str())
                    && !name.starts_with("server_info_")
            })
            .collect())
    }

    /// Whether any task references the config. `None` when the uuid is
    /// not visible.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn config_in_use(&mut self, uuid: &str) -> Result<Option<bool>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "configs", uuid, user_rid)? else {
                return Ok(None);
            };
            let used =
                tx.opt_i64("SELECT 1 FROM tasks WHERE config = ?1 LIMIT 1", params![rid])?;
            Ok::<_, scan_manager_store::StoreError>(Some(used.is_some()))
        })?)
    }

    /// Deletes a config with its preferences and selector rules in one
    /// transaction. Predefined configs and configs referenced by a task
    /// refuse deletion; a selector shared with another config survives.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_config(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "configs", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            if (1 ..= 4).contains(&rid) {
                return Ok(DeleteOutcome::InUse);
            }
            let used =
                tx.opt_i64("SELECT 1 FROM tasks WHERE config = ?1 LIMIT 1", params![rid])?;
            if used.is_some() {
                return Ok(DeleteOutcome::InUse);
            }
            let selector = tx
                .scalar_string("SELECT nvt_selector FROM configs WHERE rid = ?1", params![rid])?;
            tx.exec("DELETE FROM config_preferences WHERE config = ?1", params![rid])?;
            tx.exec("DELETE FROM configs WHERE rid = ?1", params![rid])?;
            let shared = tx.opt_i64(
                "SELECT 1 FROM configs WHERE nvt_selector = ?1 LIMIT 1",
                params![selector],
            )?;
            if shared.is_none() {
                tx.exec("DELETE FROM nvt_selectors WHERE name = ?1", params![selector])?;
            }
            Ok::<_, EntityError>(DeleteOutcome::Deleted)
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::NewConfig;
    use crate::outcome::CreateOutcome;
    use crate::outcome::DeleteOutcome;
    use crate::outcome::ModifyOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    #[test]
    fn cloning_full_and_fast_copies_rules_and_preferences() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let new = NewConfig {
            name: "My deep scan".to_string(),
            comment: String::new(),
            base: Some("698f691e-7489-11df-9d8c-002264764cea".to_string()),
        };
        let CreateOutcome::Created(uuid) = manage.create_config(&new).unwrap() else {
            panic!("expected create");
        };
        let config = manage.find_config_by_uuid(uuid.as_str()).unwrap().unwrap();
        // The clone owns a selector named by its own uuid.
        assert_eq!(config.nvt_selector, uuid.as_str());
        assert!(config.families_growing);
        // The ultimate base carries the safe_checks override.
        assert_eq!(
            manage
                .config_effective_preference(uuid.as_str(), "safe_checks")
                .unwrap()
                .as_deref(),
            Some("no")
        );
    }

    #[test]
    fn effective_preference_falls_back_to_canonical_default() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        manage.set_nvt_preference("Ping Host[checkbox]:Do a TCP ping", "yes").unwrap();
        let new = NewConfig {
            name: "Fallbacks".to_string(),
            ..NewConfig::default()
        };
        let CreateOutcome::Created(uuid) = manage.create_config(&new).unwrap() else {
            panic!("expected create");
        };
        assert_eq!(
            manage
                .config_effective_preference(uuid.as_str(), "Ping Host[checkbox]:Do a TCP ping")
                .unwrap()
                .as_deref(),
            Some("yes")
        );
        manage
            .set_config_preference(
                uuid.as_str(),
                Some("PLUGINS_PREFS"),
                "Ping Host[checkbox]:Do a TCP ping",
                "no",
            )
            .unwrap();
        assert_eq!(
            manage
                .config_effective_preference(uuid.as_str(), "Ping Host[checkbox]:Do a TCP ping")
                .unwrap()
                .as_deref(),
            Some("no")
        );
    }

    #[test]
    fn scanner_preference_iteration_excludes_internal_names() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let new = NewConfig {
            name: "Scanner prefs".to_string(),
            ..NewConfig::default()
        };
        let CreateOutcome::Created(uuid) = manage.create_config(&new).unwrap() else {
            panic!("expected create");
        };
        for (name, value) in [
            ("checks_read_timeout", "5"),
            ("cache_folder", "/var/cache"),
            ("server_info_version", "x"),
        ] {
            manage
                .set_config_preference(uuid.as_str(), Some("SERVER_PREFS"), name, value)
                .unwrap();
        }
        let listed = manage.config_scanner_preferences(uuid.as_str()).unwrap();
        assert_eq!(listed, vec![("checks_read_timeout".to_string(), "5".to_string())]);
    }

    #[test]
    fn predefined_configs_refuse_modify_and_delete() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        assert_eq!(
            manage
                .modify_config("daba56c8-73ec-11df-a475-002264764cea", "renamed", "")
                .unwrap(),
            ModifyOutcome::Busy
        );
        assert_eq!(
            manage.delete_config("daba56c8-73ec-11df-a475-002264764cea").unwrap(),
            DeleteOutcome::InUse
        );
    }

    #[test]
    fn delete_cleans_preferences_and_private_selector() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let new = NewConfig {
            name: "Disposable".to_string(),
            ..NewConfig::default()
        };
        let CreateOutcome::Created(uuid) = manage.create_config(&new).unwrap() else {
            panic!("expected create");
        };
        manage
            .set_config_preference(uuid.as_str(), Some("SERVER_PREFS"), "safe_checks", "yes")
            .unwrap();
        assert_eq!(manage.delete_config(uuid.as_str()).unwrap(), DeleteOutcome::Deleted);
        let orphans = manage
            .store()
            .immediate(|tx| {
                tx.scalar_i64(
                    "SELECT count(*) FROM config_preferences
                     WHERE config NOT IN (SELECT rid FROM configs)",
                    [],
                )
            })
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
