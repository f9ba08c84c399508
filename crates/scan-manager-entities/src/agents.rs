// crates/scan-manager-entities/src/agents.rs
// ============================================================================
// Module: Agent Repository
// Description: Accessors for downloadable agent installers.
// Purpose: Store installer payloads with signature-derived trust and the
//          accompanying how-to texts.
// Dependencies: crate::{access, context, outcome, trust}, base64, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! An agent carries an installer payload (stored raw and base64), an
//! optional detached signature, and installation/usage notes. Trust is
//! derived at create time by the gpg adapter and recorded with its
//! timestamp; a failed or indeterminate verification never blocks the
//! create, it only lands in the trust column.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rusqlite::params;
use scan_manager_core::EntityUuid;
use scan_manager_core::TrustLevel;

use crate::access::name_taken;
use crate::access::visible_count;
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

/// One agent row, installer payload omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for global agents.
    pub owner: Option<i64>,
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Original installer filename.
    pub installer_filename: String,
    /// Signature-derived trust.
    pub installer_trust: TrustLevel,
    /// When trust was derived, unix seconds.
    pub installer_trust_time: i64,
    /// Installation notes.
    pub howto_install: String,
    /// Usage notes.
    pub howto_use: String,
}

/// Fields for an agent create.
#[derive(Debug, Clone, Default)]
pub struct NewAgent {
    /// Display name.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Raw installer payload.
    pub installer: Vec<u8>,
    /// Original installer filename.
    pub installer_filename: String,
    /// Base64 detached signature, if provided.
    pub installer_signature_64: Option<String>,
    /// Installation notes.
    pub howto_install: String,
    /// Usage notes.
    pub howto_use: String,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Maps one row of the standard agent projection.
fn agent_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        rid: row.get(0)?,
        uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
        owner: row.get(2)?,
        name: row.get(3)?,
        comment: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        installer_filename: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        installer_trust: TrustLevel::from_code(row.get(6)?).unwrap_or(TrustLevel::Unknown),
        installer_trust_time: row.get::<_, Option<i64>>(7)?.unwrap_or_default(),
        howto_install: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        howto_use: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
    })
}

impl Manage {
    /// Creates an agent owned by the session user. When a signature and a
    /// verifier are available, trust is derived now; otherwise it stays
    /// unknown.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_agent(
        &mut self,
        new: &NewAgent,
        verifier: Option<&SignatureVerifier>,
    ) -> Result<CreateOutcome, EntityError> {
        let trust = match (&new.installer_signature_64, verifier) {
            (Some(signature_64), Some(verifier)) => match BASE64.decode(signature_64) {
                Ok(signature) => verifier.verify_detached(&new.installer, &signature),
                Err(_) => return Ok(CreateOutcome::InvalidInput),
            },
            _ => TrustLevel::Unknown,
        };
        let installer_64 = BASE64.encode(&new.installer);
        let user_rid = self.user_rid();
        let uuid = EntityUuid::generate();
        let now = unix_now();
        self.store().exclusive(|tx| {
            if name_taken(tx, "agents", &new.name, user_rid)? {
                return Ok(CreateOutcome::Exists);
            }
            tx.exec(
                "INSERT INTO agents (uuid, owner, name, comment, installer, installer_64,
                                     installer_filename, installer_signature_64,
                                     installer_trust, installer_trust_time, howto_install,
                                     howto_use)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    uuid.as_str(),
                    user_rid,
                    new.name,
                    new.comment,
                    new.installer,
                    installer_64,
                    new.installer_filename,
                    new.installer_signature_64,
                    trust.code(),
                    now,
                    new.howto_install,
                    new.howto_use
                ],
            )?;
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible agent by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_agent_by_uuid(&mut self, uuid: &str) -> Result<Option<Agent>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "agents", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT rid, uuid, owner, name, comment, installer_filename,
                        installer_trust, installer_trust_time, howto_install, howto_use
                 FROM agents WHERE rid = ?1",
                params![rid],
                agent_from_row,
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Reads an agent's installer payload.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn agent_installer(&mut self, uuid: &str) -> Result<Option<Vec<u8>>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "agents", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT installer FROM agents WHERE rid = ?1",
                params![rid],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            )
        })?;
        Ok(rows.into_iter().next().flatten())
    }

    /// Iterates agents visible to the session, in rid order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_agents(&mut self) -> Result<Vec<Agent>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let sql = "SELECT rid, uuid, owner, name, comment, installer_filename,
                              installer_trust, installer_trust_time, howto_install,
                              howto_use
                       FROM agents";
            match user_rid {
                Some(rid) => tx.rows(
                    &format!("{sql} WHERE owner IS NULL OR owner = ?1 ORDER BY rid"),
                    params![rid],
                    agent_from_row,
                ),
                None => tx.rows(
                    &format!("{sql} WHERE owner IS NULL ORDER BY rid"),
                    [],
                    agent_from_row,
                ),
            }
        })?)
    }

    /// Modifies an agent's name, comment, and how-to texts. The installer
    /// payload and its trust are fixed at create time.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn modify_agent(
        &mut self,
        uuid: &str,
        name: &str,
        comment: &str,
        howto_install: &str,
        howto_use: &str,
    ) -> Result<ModifyOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "agents", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            let current_name =
                tx.scalar_string("SELECT name FROM agents WHERE rid = ?1", params![rid])?;
            if current_name != name && name_taken(tx, "agents", name, user_rid)? {
                return Ok(ModifyOutcome::Exists);
            }
            tx.exec(
                "UPDATE agents SET name = ?1, comment = ?2, howto_install = ?3,
                                   howto_use = ?4
                 WHERE rid = ?5",
                params![name, comment, howto_install, howto_use, rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Counts agents visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_agents(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| visible_count(tx, "agents", user_rid))?)
    }

    /// Re-derives an agent's trust from its stored signature.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn verify_agent(
        &mut self,
        uuid: &str,
        verifier: &SignatureVerifier,
    ) -> Result<ModifyOutcome, EntityError> {
        let user_rid = self.user_rid();
        let now = unix_now();
        let fetched = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "agents", uuid, user_rid)? else {
                return Ok(None);
            };
            let rows = tx.rows(
                "SELECT installer, installer_signature_64 FROM agents WHERE rid = ?1",
                params![rid],
                |row| {
                    Ok((
                        row.get::<_, Option<Vec<u8>>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )?;
            Ok::<_, scan_manager_store::StoreError>(
                rows.into_iter().next().map(|payload| (rid, payload)),
            )
        })?;
        let Some((rid, (installer, signature_64))) = fetched else {
            return Ok(ModifyOutcome::Missing);
        };
        let trust = match signature_64 {
            Some(signature_64) => match BASE64.decode(&signature_64) {
                Ok(signature) => {
                    verifier.verify_detached(&installer.unwrap_or_default(), &signature)
                }
                Err(_) => TrustLevel::Unknown,
            },
            None => TrustLevel::Unknown,
        };
        self.store().exclusive(|tx| {
            tx.exec(
                "UPDATE agents SET installer_trust = ?1, installer_trust_time = ?2
                 WHERE rid = ?3",
                params![trust.code(), now, rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Deletes an agent. Agents are never referenced, so delete always
    /// proceeds for a visible row.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_agent(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "agents", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            tx.exec("DELETE FROM agents WHERE rid = ?1", params![rid])?;
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

    use std::time::Duration;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use scan_manager_core::TrustLevel;

    use super::NewAgent;
    use crate::outcome::CreateOutcome;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;
    use crate::trust::SignatureVerifier;

    fn sample_agent() -> NewAgent {
        NewAgent {
            name: "probe".to_string(),
            installer: b"#!/bin/sh\necho probe\n".to_vec(),
            installer_filename: "probe.sh".to_string(),
            ..NewAgent::default()
        }
    }

    #[test]
    fn unsigned_agents_store_unknown_trust() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let CreateOutcome::Created(uuid) = manage.create_agent(&sample_agent(), None).unwrap()
        else {
            panic!("expected create");
        };
        let agent = manage.find_agent_by_uuid(uuid.as_str()).unwrap().unwrap();
        assert_eq!(agent.installer_trust, TrustLevel::Unknown);
    }

    #[test]
    fn failed_verification_never_blocks_creation() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let mut signed = sample_agent();
        signed.installer_signature_64 = Some(BASE64.encode(b"not a real signature"));
        let verifier = SignatureVerifier::new("false", Duration::from_secs(5));
        let CreateOutcome::Created(uuid) =
            manage.create_agent(&signed, Some(&verifier)).unwrap()
        else {
            panic!("expected create despite bad signature");
        };
        let agent = manage.find_agent_by_uuid(uuid.as_str()).unwrap().unwrap();
        assert_eq!(agent.installer_trust, TrustLevel::No);
    }

    #[test]
    fn installer_payload_round_trips() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let CreateOutcome::Created(uuid) = manage.create_agent(&sample_agent(), None).unwrap()
        else {
            panic!("expected create");
        };
        assert_eq!(
            manage.agent_installer(uuid.as_str()).unwrap().unwrap(),
            b"#!/bin/sh\necho probe\n".to_vec()
        );
    }
}
