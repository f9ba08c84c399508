// crates/scan-manager-entities/src/escalators.rs
// ============================================================================
// Module: Escalator Repository
// Description: Accessors for escalator records and their task bindings.
// Purpose: Store event/condition/method codes with per-name parameters and
//          bind escalators to tasks; dispatch lives in the escalation
//          engine crate.
// Dependencies: crate::{access, context, outcome}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! An escalator binds an event code, a condition code, and a method code;
//! three side tables carry per-name string parameters for each code.
//! Deleting an escalator removes its side-table rows in the same
//! exclusive transaction; an escalator bound to a task refuses deletion.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use rusqlite::params;
use scan_manager_core::ConditionKind;
use scan_manager_core::EntityUuid;
use scan_manager_core::EventKind;
use scan_manager_core::MethodKind;

use crate::access::name_taken;
use crate::access::visible_count;
use crate::access::visible_rid_by_uuid;
use crate::context::EntityError;
use crate::context::Manage;
use crate::outcome::CreateOutcome;
use crate::outcome::DeleteOutcome;
use crate::outcome::ModifyOutcome;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One escalator with its parameter maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalator {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for global escalators.
    pub owner: Option<i64>,
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Event code.
    pub event: EventKind,
    /// Condition code.
    pub condition: ConditionKind,
    /// Method code.
    pub method: MethodKind,
    /// Event parameters by name.
    pub event_data: BTreeMap<String, String>,
    /// Condition parameters by name.
    pub condition_data: BTreeMap<String, String>,
    /// Method parameters by name.
    pub method_data: BTreeMap<String, String>,
}

/// Fields for an escalator create.
#[derive(Debug, Clone)]
pub struct NewEscalator {
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Event code.
    pub event: EventKind,
    /// Condition code.
    pub condition: ConditionKind,
    /// Method code.
    pub method: MethodKind,
    /// Event parameters by name.
    pub event_data: BTreeMap<String, String>,
    /// Condition parameters by name.
    pub condition_data: BTreeMap<String, String>,
    /// Method parameters by name.
    pub method_data: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Reads one side table into a parameter map.
fn data_map(
    tx: &scan_manager_store::Tx<'_>,
    table: &str,
    escalator_rid: i64,
) -> Result<BTreeMap<String, String>, scan_manager_store::StoreError> {
    let rows = tx.rows(
        &format!("SELECT name, data FROM {table} WHERE escalator = ?1"),
        params![escalator_rid],
        |row| {
            Ok((
                row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            ))
        },
    )?;
    Ok(rows.into_iter().collect())
}

impl Manage {
    /// Creates an escalator with its parameter rows.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_escalator(
        &mut self,
        new: &NewEscalator,
    ) -> Result<CreateOutcome, EntityError> {
        let user_rid = self.user_rid();
        let uuid = EntityUuid::generate();
        self.store().exclusive(|tx| {
            if name_taken(tx, "escalators", &new.name, user_rid)? {
                return Ok(CreateOutcome::Exists);
            }
            tx.exec(
                "INSERT INTO escalators (uuid, owner, name, comment, event, condition,
                                         method)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    uuid.as_str(),
                    user_rid,
                    new.name,
                    new.comment,
                    new.event.code(),
                    new.condition.code(),
                    new.method.code()
                ],
            )?;
            let rid = tx.last_insert_rid();
            for (table, map) in [
                ("escalator_event_data", &new.event_data),
                ("escalator_condition_data", &new.condition_data),
                ("escalator_method_data", &new.method_data),
            ] {
                for (name, data) in map {
                    tx.exec(
                        &format!("INSERT INTO {table} (escalator, name, data) VALUES (?1, ?2, ?3)"),
                        params![rid, name, data],
                    )?;
                }
            }
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible escalator by uuid, parameters included.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_escalator_by_uuid(
        &mut self,
        uuid: &str,
    ) -> Result<Option<Escalator>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "escalators", uuid, user_rid)? else {
                return Ok(None);
            };
            escalator_by_rid(tx, rid)
        })?)
    }

    /// Escalators bound to one task, in binding order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn task_escalators(&mut self, task_rid: i64) -> Result<Vec<Escalator>, EntityError> {
        Ok(self.store().immediate(|tx| {
            let rids = tx.rows(
                "SELECT escalator FROM task_escalators WHERE task = ?1 ORDER BY rid",
                params![task_rid],
                |row| row.get::<_, i64>(0),
            )?;
            let mut escalators = Vec::new();
            for rid in rids {
                if let Some(escalator) = escalator_by_rid(tx, rid)? {
                    escalators.push(escalator);
                }
            }
            Ok::<_, scan_manager_store::StoreError>(escalators)
        })?)
    }

    /// Binds an escalator to a task.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn add_task_escalator(
        &mut self,
        task_uuid: &str,
        escalator_uuid: &str,
    ) -> Result<ModifyOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(task_rid) = visible_rid_by_uuid(tx, "tasks", task_uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            let Some(escalator_rid) =
                visible_rid_by_uuid(tx, "escalators", escalator_uuid, user_rid)?
            else {
                return Ok(ModifyOutcome::Missing);
            };
            let bound = tx.opt_i64(
                "SELECT 1 FROM task_escalators WHERE task = ?1 AND escalator = ?2 LIMIT 1",
                params![task_rid, escalator_rid],
            )?;
            if bound.is_none() {
                tx.exec(
                    "INSERT INTO task_escalators (task, escalator) VALUES (?1, ?2)",
                    params![task_rid, escalator_rid],
                )?;
            }
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Iterates escalators visible to the session, in rid order,
    /// parameters included.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_escalators(&mut self) -> Result<Vec<Escalator>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let rids = match user_rid {
                Some(rid) => tx.rows(
                    "SELECT rid FROM escalators WHERE owner IS NULL OR owner = ?1
                     ORDER BY rid",
                    params![rid],
                    |row| row.get::<_, i64>(0),
                )?,
                None => tx.rows(
                    "SELECT rid FROM escalators WHERE owner IS NULL ORDER BY rid",
                    [],
                    |row| row.get::<_, i64>(0),
                )?,
            };
            let mut escalators = Vec::new();
            for rid in rids {
                if let Some(escalator) = escalator_by_rid(tx, rid)? {
                    escalators.push(escalator);
                }
            }
            Ok::<_, scan_manager_store::StoreError>(escalators)
        })?)
    }

    /// Counts escalators visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_escalators(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| visible_count(tx, "escalators", user_rid))?)
    }

    /// Whether any task binds the escalator. `None` when the uuid is not
    /// visible.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn escalator_in_use(&mut self, uuid: &str) -> Result<Option<bool>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "escalators", uuid, user_rid)? else {
                return Ok(None);
            };
            let used = tx.opt_i64(
                "SELECT 1 FROM task_escalators WHERE escalator = ?1 LIMIT 1",
                params![rid],
            )?;
            Ok::<_, scan_manager_store::StoreError>(Some(used.is_some()))
        })?)
    }

    /// Deletes an escalator and its parameter rows in one transaction,
    /// unless a task binds it.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_escalator(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "escalators", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            let used = tx.opt_i64(
                "SELECT 1 FROM task_escalators WHERE escalator = ?1 LIMIT 1",
                params![rid],
            )?;
            if used.is_some() {
                return Ok(DeleteOutcome::InUse);
            }
            tx.exec("DELETE FROM escalator_event_data WHERE escalator = ?1", params![rid])?;
            tx.exec(
                "DELETE FROM escalator_condition_data WHERE escalator = ?1",
                params![rid],
            )?;
            tx.exec("DELETE FROM escalator_method_data WHERE escalator = ?1", params![rid])?;
            tx.exec("DELETE FROM escalators WHERE rid = ?1", params![rid])?;
            Ok::<_, EntityError>(DeleteOutcome::Deleted)
        })
    }
}

/// Loads one escalator with its parameter maps.
fn escalator_by_rid(
    tx: &scan_manager_store::Tx<'_>,
    rid: i64,
) -> Result<Option<Escalator>, scan_manager_store::StoreError> {
    let rows = tx.rows(
        "SELECT rid, uuid, owner, name, comment, event, condition, method
         FROM escalators WHERE rid = ?1",
        params![rid],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
            ))
        },
    )?;
    let Some((rid, uuid, owner, name, comment, event, condition, method)) =
        rows.into_iter().next()
    else {
        return Ok(None);
    };
    let (Some(event), Some(condition), Some(method)) = (
        EventKind::from_code(event),
        ConditionKind::from_code(condition),
        MethodKind::from_code(method),
    ) else {
        return Ok(None);
    };
    Ok(Some(Escalator {
        rid,
        uuid: EntityUuid::from_stored(uuid),
        owner,
        name,
        comment,
        event,
        condition,
        method,
        event_data: data_map(tx, "escalator_event_data", rid)?,
        condition_data: data_map(tx, "escalator_condition_data", rid)?,
        method_data: data_map(tx, "escalator_method_data", rid)?,
    }))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::collections::BTreeMap;

    use scan_manager_core::ConditionKind;
    use scan_manager_core::EventKind;
    use scan_manager_core::MethodKind;

    use super::NewEscalator;
    use crate::outcome::CreateOutcome;
    use crate::outcome::DeleteOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    fn mail_on_done() -> NewEscalator {
        let mut event_data = BTreeMap::new();
        event_data.insert("status".to_string(), "Done".to_string());
        let mut method_data = BTreeMap::new();
        method_data.insert("to_address".to_string(), "sec@example.com".to_string());
        NewEscalator {
            name: "Mail on done".to_string(),
            comment: String::new(),
            event: EventKind::TaskRunStatusChanged,
            condition: ConditionKind::Always,
            method: MethodKind::Email,
            event_data,
            condition_data: BTreeMap::new(),
            method_data,
        }
    }

    #[test]
    fn parameters_round_trip_through_the_side_tables() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let CreateOutcome::Created(uuid) = manage.create_escalator(&mail_on_done()).unwrap()
        else {
            panic!("expected create");
        };
        let escalator = manage.find_escalator_by_uuid(uuid.as_str()).unwrap().unwrap();
        assert_eq!(escalator.event_data.get("status").map(String::as_str), Some("Done"));
        assert_eq!(
            escalator.method_data.get("to_address").map(String::as_str),
            Some("sec@example.com")
        );
    }

    #[test]
    fn delete_removes_side_table_rows_in_one_transaction() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let CreateOutcome::Created(uuid) = manage.create_escalator(&mail_on_done()).unwrap()
        else {
            panic!("expected create");
        };
        assert_eq!(manage.delete_escalator(uuid.as_str()).unwrap(), DeleteOutcome::Deleted);
        let leftovers = manage
            .store()
            .immediate(|tx| {
                tx.scalar_i64(
                    "SELECT count(*) FROM escalator_event_data
                     UNION ALL SELECT count(*) FROM escalator_method_data
                     ORDER BY 1 DESC LIMIT 1",
                    [],
                )
            })
            .unwrap();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn bound_escalators_refuse_deletion() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let CreateOutcome::Created(escalator_uuid) =
            manage.create_escalator(&mail_on_done()).unwrap()
        else {
            panic!("expected create");
        };
        // Bind to the example task.
        let task_uuid = "343435d6-91b0-11de-9478-ffd71f4c6f29";
        manage.add_task_escalator(task_uuid, escalator_uuid.as_str()).unwrap();
        assert_eq!(
            manage.delete_escalator(escalator_uuid.as_str()).unwrap(),
            DeleteOutcome::InUse
        );
        assert_eq!(manage.escalator_in_use(escalator_uuid.as_str()).unwrap(), Some(true));
    }
}
