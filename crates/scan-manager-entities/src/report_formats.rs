// crates/scan-manager-entities/src/report_formats.rs
// ============================================================================
// Module: Report Format Repository
// Description: Accessors for report-format plugins and their parameters.
// Purpose: Store format metadata, signature trust, the active flag, and
//          typed parameters with option lists.
// Dependencies: crate::{access, context, outcome, trust}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! A report format names an external `generate` filter plus typed
//! parameters. Bit 0 of `flags` marks the format active. Trust is derived
//! from a detached signature over the filter script; the eight predefined
//! formats are seeded trusted and are never deleted. Parameter values are
//! validated against their declared type, bounds, and option list.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::params;
use scan_manager_core::EntityUuid;
use scan_manager_core::TrustLevel;

use crate::access::name_taken;
use crate::access::visible_rid_by_uuid;
use crate::context::EntityError;
use crate::context::Manage;
use crate::context::unix_now;
use crate::outcome::CreateOutcome;
use crate::outcome::DeleteOutcome;
use crate::outcome::ModifyOutcome;
use crate::trust::SignatureVerifier;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// The active bit in `flags`.
const FLAG_ACTIVE: i64 = 1;

/// Report-format parameter type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Free-form string.
    String,
    /// Integer with optional bounds.
    Integer,
    /// One of the declared options.
    Selection,
    /// 0 or 1.
    Boolean,
}

impl ParamType {
    /// Returns the stable store code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::String => 0,
            Self::Integer => 1,
            Self::Selection => 2,
            Self::Boolean => 3,
        }
    }

    /// Decodes a store code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::String),
            1 => Some(Self::Integer),
            2 => Some(Self::Selection),
            3 => Some(Self::Boolean),
            _ => None,
        }
    }
}

/// One report-format row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFormat {
    /// Row id.
    pub rid: i64,
    /// Stable identifier; names the on-disk filter directory.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for the predefined formats.
    pub owner: Option<i64>,
    /// Display name.
    pub name: String,
    /// Artifact filename extension.
    pub extension: String,
    /// Artifact content type.
    pub content_type: String,
    /// Summary line.
    pub summary: String,
    /// Long description.
    pub description: String,
    /// Signature-derived trust.
    pub trust: TrustLevel,
    /// When trust was last derived, unix seconds.
    pub trust_time: i64,
    /// Whether the format is active.
    pub active: bool,
}

/// One typed parameter of a format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFormatParam {
    /// Row id.
    pub rid: i64,
    /// Parameter name.
    pub name: String,
    /// Declared type.
    pub param_type: ParamType,
    /// Current value.
    pub value: String,
    /// Declared default.
    pub default_value: String,
    /// Lower bound for integers.
    pub min_value: Option<i64>,
    /// Upper bound for integers.
    pub max_value: Option<i64>,
    /// Declared options for selections.
    pub options: Vec<String>,
}

/// Fields for a format create.
#[derive(Debug, Clone, Default)]
pub struct NewReportFormat {
    /// Display name.
    pub name: String,
    /// Artifact filename extension.
    pub extension: String,
    /// Artifact content type.
    pub content_type: String,
    /// Summary line.
    pub summary: String,
    /// Long description.
    pub description: String,
    /// Detached signature over the filter script, if provided.
    pub signature: Option<String>,
    /// Parameters: (name, type, default, min, max, options).
    pub params: Vec<(String, ParamType, String, Option<i64>, Option<i64>, Vec<String>)>,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Maps one row of the standard report-format projection.
fn report_format_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportFormat> {
    Ok(ReportFormat {
        rid: row.get(0)?,
        uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
        owner: row.get(2)?,
        name: row.get(3)?,
        extension: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        content_type: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        summary: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        description: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        trust: TrustLevel::from_code(row.get(8)?).unwrap_or(TrustLevel::Unknown),
        trust_time: row.get::<_, Option<i64>>(9)?.unwrap_or_default(),
        active: row.get::<_, i64>(10)? & FLAG_ACTIVE != 0,
    })
}

impl Manage {
    /// Creates a user-owned report format. Trust starts unknown until
    /// [`Manage::verify_report_format`] runs against the filter script.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_report_format(
        &mut self,
        new: &NewReportFormat,
    ) -> Result<CreateOutcome, EntityError> {
        let user_rid = self.user_rid();
        let uuid = EntityUuid::generate();
        self.store().exclusive(|tx| {
            if name_taken(tx, "report_formats", &new.name, user_rid)? {
                return Ok(CreateOutcome::Exists);
            }
            tx.exec(
                "INSERT INTO report_formats (uuid, owner, name, extension, content_type,
                                             summary, description, signature, trust,
                                             trust_time, flags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0)",
                params![
                    uuid.as_str(),
                    user_rid,
                    new.name,
                    new.extension,
                    new.content_type,
                    new.summary,
                    new.description,
                    new.signature,
                    TrustLevel::Unknown.code()
                ],
            )?;
            let format_rid = tx.last_insert_rid();
            for (name, param_type, default, min, max, options) in &new.params {
                tx.exec(
                    "INSERT INTO report_format_params (report_format, name, type, value,
                                                       default_value, min_value, max_value)
                     VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)",
                    params![format_rid, name, param_type.code(), default, min, max],
                )?;
                let param_rid = tx.last_insert_rid();
                for option in options {
                    tx.exec(
                        "INSERT INTO report_format_param_options (report_format_param, value)
                         VALUES (?1, ?2)",
                        params![param_rid, option],
                    )?;
                }
            }
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible report format by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_report_format_by_uuid(
        &mut self,
        uuid: &str,
    ) -> Result<Option<ReportFormat>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "report_formats", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT rid, uuid, owner, name, extension, content_type, summary,
                        description, trust, trust_time, flags
                 FROM report_formats WHERE rid = ?1",
                params![rid],
                report_format_from_row,
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Iterates report formats visible to the session, in rid order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_report_formats(&mut self) -> Result<Vec<ReportFormat>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let sql = "SELECT rid, uuid, owner, name, extension, content_type, summary,
                              description, trust, trust_time, flags
                       FROM report_formats";
            match user_rid {
                Some(rid) => tx.rows(
                    &format!("{sql} WHERE owner IS NULL OR owner = ?1 ORDER BY rid"),
                    params![rid],
                    report_format_from_row,
                ),
                None => tx.rows(
                    &format!("{sql} WHERE owner IS NULL ORDER BY rid"),
                    [],
                    report_format_from_row,
                ),
            }
        })?)
    }

    /// Counts report formats visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_report_formats(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self
            .store()
            .immediate(|tx| crate::access::visible_count(tx, "report_formats", user_rid))?)
    }

    /// Reads a format's parameters with their option lists.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn report_format_params(
        &mut self,
        uuid: &str,
    ) -> Result<Vec<ReportFormatParam>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "report_formats", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            let raw = tx.rows(
                "SELECT rid, name, type, value, default_value, min_value, max_value
                 FROM report_format_params WHERE report_format = ?1 ORDER BY rid",
                params![rid],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                    ))
                },
            )?;
            let mut out = Vec::new();
            for (param_rid, name, type_code, value, default_value, min, max) in raw {
                let options = tx.rows(
                    "SELECT value FROM report_format_param_options
                     WHERE report_format_param = ?1 ORDER BY rid",
                    params![param_rid],
                    |row| row.get::<_, String>(0),
                )?;
                out.push(ReportFormatParam {
                    rid: param_rid,
                    name,
                    param_type: ParamType::from_code(type_code).unwrap_or(ParamType::String),
                    value,
                    default_value,
                    min_value: min,
                    max_value: max,
                    options,
                });
            }
            Ok::<_, scan_manager_store::StoreError>(out)
        })?)
    }

    /// Sets one parameter value after validating it against the declared
    /// type, bounds, and option list.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn modify_report_format_param(
        &mut self,
        uuid: &str,
        param_name: &str,
        value: &str,
    ) -> Result<ModifyOutcome, EntityError> {
        let params_list = self.report_format_params(uuid)?;
        let Some(param) = params_list.iter().find(|param| param.name == param_name) else {
            return Ok(ModifyOutcome::Missing);
        };
        let valid = match param.param_type {
            ParamType::String => true,
            ParamType::Boolean => value == "0" || value == "1",
            ParamType::Integer => value.parse::<i64>().is_ok_and(|number| {
                param.min_value.is_none_or(|min| number >= min)
                    && param.max_value.is_none_or(|max| number <= max)
            }),
            ParamType::Selection => param.options.iter().any(|option| option == value),
        };
        if !valid {
            return Ok(ModifyOutcome::InvalidInput);
        }
        let param_rid = param.rid;
        self.store().exclusive(|tx| {
            tx.exec(
                "UPDATE report_format_params SET value = ?1 WHERE rid = ?2",
                params![value, param_rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Flips the active bit.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn set_report_format_active(
        &mut self,
        uuid: &str,
        active: bool,
    ) -> Result<ModifyOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "report_formats", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            if active {
                tx.exec(
                    "UPDATE report_formats SET flags = flags | ?1 WHERE rid = ?2",
                    params![FLAG_ACTIVE, rid],
                )?;
            } else {
                tx.exec(
                    "UPDATE report_formats SET flags = flags & ~?1 WHERE rid = ?2",
                    params![FLAG_ACTIVE, rid],
                )?;
            }
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Re-derives trust from the stored signature over the filter script
    /// bytes the caller read from the format directory.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn verify_report_format(
        &mut self,
        uuid: &str,
        script: &[u8],
        verifier: &SignatureVerifier,
    ) -> Result<ModifyOutcome, EntityError> {
        let user_rid = self.user_rid();
        let now = unix_now();
        let fetched = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "report_formats", uuid, user_rid)? else {
                return Ok(None);
            };
            let signature = tx.opt_string(
                "SELECT signature FROM report_formats WHERE rid = ?1",
                params![rid],
            )?;
            Ok::<_, scan_manager_store::StoreError>(Some((rid, signature)))
        })?;
        let Some((rid, signature)) = fetched else {
            return Ok(ModifyOutcome::Missing);
        };
        let trust = match signature {
            Some(signature) if !signature.is_empty() => {
                verifier.verify_detached(script, signature.as_bytes())
            }
            _ => TrustLevel::Unknown,
        };
        self.store().exclusive(|tx| {
            tx.exec(
                "UPDATE report_formats SET trust = ?1, trust_time = ?2 WHERE rid = ?3",
                params![trust.code(), now, rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Deletes a user-owned report format with its parameters and options
    /// in one transaction. Predefined (global) formats and formats named
    /// by an escalator refuse deletion.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_report_format(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "report_formats", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            let global = tx.opt_i64(
                "SELECT 1 FROM report_formats WHERE rid = ?1 AND owner IS NULL",
                params![rid],
            )?;
            if global.is_some() {
                return Ok(DeleteOutcome::InUse);
            }
            let referenced = tx.opt_i64(
                "SELECT 1 FROM escalator_method_data
                 WHERE name = 'notice_report_format' AND data = ?1 LIMIT 1",
                params![uuid],
            )?;
            if referenced.is_some() {
                return Ok(DeleteOutcome::InUse);
            }
            tx.exec(
                "DELETE FROM report_format_param_options
                 WHERE report_format_param IN
                     (SELECT rid FROM report_format_params WHERE report_format = ?1)",
                params![rid],
            )?;
            tx.exec("DELETE FROM report_format_params WHERE report_format = ?1", params![rid])?;
            tx.exec("DELETE FROM report_formats WHERE rid = ?1", params![rid])?;
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

    use super::NewReportFormat;
    use super::ParamType;
    use crate::outcome::CreateOutcome;
    use crate::outcome::DeleteOutcome;
    use crate::outcome::ModifyOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    fn custom_format() -> NewReportFormat {
        NewReportFormat {
            name: "Slim CSV".to_string(),
            extension: "csv".to_string(),
            content_type: "text/csv".to_string(),
            summary: "Narrow CSV".to_string(),
            description: "Narrow CSV export".to_string(),
            signature: None,
            params: vec![
                (
                    "columns".to_string(),
                    ParamType::Integer,
                    "5".to_string(),
                    Some(1),
                    Some(20),
                    Vec::new(),
                ),
                (
                    "separator".to_string(),
                    ParamType::Selection,
                    ",".to_string(),
                    None,
                    None,
                    vec![",".to_string(), ";".to_string()],
                ),
            ],
        }
    }

    #[test]
    fn predefined_formats_cannot_be_deleted() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        assert_eq!(
            manage
                .delete_report_format("19f6f1b3-7128-4433-888c-ccc764fe6ed5")
                .unwrap(),
            DeleteOutcome::InUse
        );
    }

    #[test]
    fn param_validation_honors_bounds_and_options() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let CreateOutcome::Created(uuid) =
            manage.create_report_format(&custom_format()).unwrap()
        else {
            panic!("expected create");
        };
        assert_eq!(
            manage.modify_report_format_param(uuid.as_str(), "columns", "10").unwrap(),
            ModifyOutcome::Modified
        );
        assert_eq!(
            manage.modify_report_format_param(uuid.as_str(), "columns", "25").unwrap(),
            ModifyOutcome::InvalidInput
        );
        assert_eq!(
            manage.modify_report_format_param(uuid.as_str(), "separator", ";").unwrap(),
            ModifyOutcome::Modified
        );
        assert_eq!(
            manage.modify_report_format_param(uuid.as_str(), "separator", "|").unwrap(),
            ModifyOutcome::InvalidInput
        );
    }

    #[test]
    fn user_format_delete_cleans_params_and_options() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let CreateOutcome::Created(uuid) =
            manage.create_report_format(&custom_format()).unwrap()
        else {
            panic!("expected create");
        };
        assert_eq!(
            manage.delete_report_format(uuid.as_str()).unwrap(),
            DeleteOutcome::Deleted
        );
        let leftovers = manage
            .store()
            .immediate(|tx| {
                tx.scalar_i64(
                    "SELECT count(*) FROM report_format_params
                     WHERE report_format NOT IN (SELECT rid FROM report_formats)",
                    [],
                )
            })
            .unwrap();
        assert_eq!(leftovers, 0);
    }
}
