// crates/scan-manager-entities/src/credentials.rs
// ============================================================================
// Module: Credential Repository
// Description: Accessors for local security check credentials.
// Purpose: Store password or key-pair credentials with their generated
//          installer packages, and guard deletes behind target references.
// Dependencies: crate::{access, context, outcome}, rusqlite,
//               scan-manager-core
// ============================================================================

//! ## Overview
//! A credential is either password-only (keys null) or a key pair. The
//! RPM/DEB/EXE installer packages are produced by the external package
//! builder collaborator and stored verbatim as blobs; this repository only
//! persists them. Targets reference credentials for SSH and SMB checks.

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

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One credential row, packages omitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Row id.
    pub rid: i64,
    /// Stable identifier.
    pub uuid: EntityUuid,
    /// Owner rid; `None` for global credentials.
    pub owner: Option<i64>,
    /// Display name.
    pub name: String,
    /// Account login the scanner uses.
    pub login: String,
    /// Free-form comment.
    pub comment: String,
    /// Whether a key pair is stored (password-only otherwise).
    pub has_key_pair: bool,
}

/// Fields for a credential create.
#[derive(Debug, Clone, Default)]
pub struct NewCredential {
    /// Display name.
    pub name: String,
    /// Account login.
    pub login: String,
    /// Password; `None` for key-pair credentials with passphrase elsewhere.
    pub password: Option<String>,
    /// Free-form comment.
    pub comment: String,
    /// Public key, for key-pair credentials.
    pub public_key: Option<String>,
    /// Private key, for key-pair credentials.
    pub private_key: Option<String>,
}

/// Generated installer packages for one credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialPackages {
    /// RPM package bytes.
    pub rpm: Option<Vec<u8>>,
    /// DEB package bytes.
    pub deb: Option<Vec<u8>>,
    /// EXE installer bytes.
    pub exe: Option<Vec<u8>>,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl Manage {
    /// Creates a credential owned by the session user. A key pair requires
    /// both halves; a password-only credential requires the password.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn create_credential(
        &mut self,
        new: &NewCredential,
    ) -> Result<CreateOutcome, EntityError> {
        let keyed = new.public_key.is_some() || new.private_key.is_some();
        if keyed && (new.public_key.is_none() || new.private_key.is_none()) {
            return Ok(CreateOutcome::InvalidInput);
        }
        if !keyed && new.password.is_none() {
            return Ok(CreateOutcome::InvalidInput);
        }
        if new.login.is_empty() {
            return Ok(CreateOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        let uuid = EntityUuid::generate();
        self.store().exclusive(|tx| {
            if name_taken(tx, "lsc_credentials", &new.name, user_rid)? {
                return Ok(CreateOutcome::Exists);
            }
            tx.exec(
                "INSERT INTO lsc_credentials (uuid, owner, name, login, password, comment,
                                              public_key, private_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    uuid.as_str(),
                    user_rid,
                    new.name,
                    new.login,
                    new.password,
                    new.comment,
                    new.public_key,
                    new.private_key
                ],
            )?;
            Ok::<_, EntityError>(CreateOutcome::Created(uuid))
        })
    }

    /// Finds a visible credential by uuid.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn find_credential_by_uuid(
        &mut self,
        uuid: &str,
    ) -> Result<Option<Credential>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "lsc_credentials", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT rid, uuid, owner, name, login, comment,
                        public_key IS NOT NULL AND private_key IS NOT NULL
                 FROM lsc_credentials WHERE rid = ?1",
                params![rid],
                |row| {
                    Ok(Credential {
                        rid: row.get(0)?,
                        uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
                        owner: row.get(2)?,
                        name: row.get(3)?,
                        login: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        comment: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                        has_key_pair: row.get::<_, i64>(6)? != 0,
                    })
                },
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Iterates credentials visible to the session, in rid order.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn iterate_credentials(&mut self) -> Result<Vec<Credential>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let sql = "SELECT rid, uuid, owner, name, login, comment,
                              public_key IS NOT NULL AND private_key IS NOT NULL
                       FROM lsc_credentials";
            let map = |row: &rusqlite::Row<'_>| {
                Ok(Credential {
                    rid: row.get(0)?,
                    uuid: EntityUuid::from_stored(row.get::<_, String>(1)?),
                    owner: row.get(2)?,
                    name: row.get(3)?,
                    login: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    comment: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    has_key_pair: row.get::<_, i64>(6)? != 0,
                })
            };
            match user_rid {
                Some(rid) => tx.rows(
                    &format!("{sql} WHERE owner IS NULL OR owner = ?1 ORDER BY rid"),
                    params![rid],
                    map,
                ),
                None => tx.rows(&format!("{sql} WHERE owner IS NULL ORDER BY rid"), [], map),
            }
        })?)
    }

    /// Modifies a credential's name, login, and comment. Stored keys,
    /// passwords, and packages stay as created.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn modify_credential(
        &mut self,
        uuid: &str,
        name: &str,
        login: &str,
        comment: &str,
    ) -> Result<ModifyOutcome, EntityError> {
        if login.is_empty() {
            return Ok(ModifyOutcome::InvalidInput);
        }
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "lsc_credentials", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            let current_name = tx
                .scalar_string("SELECT name FROM lsc_credentials WHERE rid = ?1", params![rid])?;
            if current_name != name && name_taken(tx, "lsc_credentials", name, user_rid)? {
                return Ok(ModifyOutcome::Exists);
            }
            tx.exec(
                "UPDATE lsc_credentials SET name = ?1, login = ?2, comment = ?3 WHERE rid = ?4",
                params![name, login, comment, rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Counts credentials visible to the session.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn count_credentials(&mut self) -> Result<i64, EntityError> {
        let user_rid = self.user_rid();
        Ok(self
            .store()
            .immediate(|tx| visible_count(tx, "lsc_credentials", user_rid))?)
    }

    /// Stores generated installer packages for a credential.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn set_credential_packages(
        &mut self,
        uuid: &str,
        packages: &CredentialPackages,
    ) -> Result<ModifyOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "lsc_credentials", uuid, user_rid)? else {
                return Ok(ModifyOutcome::Missing);
            };
            tx.exec(
                "UPDATE lsc_credentials SET rpm = ?1, deb = ?2, exe = ?3 WHERE rid = ?4",
                params![packages.rpm, packages.deb, packages.exe, rid],
            )?;
            Ok::<_, EntityError>(ModifyOutcome::Modified)
        })
    }

    /// Reads the stored installer packages.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn credential_packages(
        &mut self,
        uuid: &str,
    ) -> Result<Option<CredentialPackages>, EntityError> {
        let user_rid = self.user_rid();
        let rows = self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "lsc_credentials", uuid, user_rid)? else {
                return Ok(Vec::new());
            };
            tx.rows(
                "SELECT rpm, deb, exe FROM lsc_credentials WHERE rid = ?1",
                params![rid],
                |row| {
                    Ok(CredentialPackages {
                        rpm: row.get(0)?,
                        deb: row.get(1)?,
                        exe: row.get(2)?,
                    })
                },
            )
        })?;
        Ok(rows.into_iter().next())
    }

    /// Whether any target references the credential. `None` when the uuid
    /// is not visible.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn credential_in_use(&mut self, uuid: &str) -> Result<Option<bool>, EntityError> {
        let user_rid = self.user_rid();
        Ok(self.store().immediate(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "lsc_credentials", uuid, user_rid)? else {
                return Ok(None);
            };
            let used = tx.opt_i64(
                "SELECT 1 FROM targets
                 WHERE lsc_credential = ?1 OR smb_lsc_credential = ?1 LIMIT 1",
                params![rid],
            )?;
            Ok::<_, scan_manager_store::StoreError>(Some(used.is_some()))
        })?)
    }

    /// Deletes a credential unless a target references it.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError`] on store failure.
    pub fn delete_credential(&mut self, uuid: &str) -> Result<DeleteOutcome, EntityError> {
        let user_rid = self.user_rid();
        self.store().exclusive(|tx| {
            let Some(rid) = visible_rid_by_uuid(tx, "lsc_credentials", uuid, user_rid)? else {
                return Ok(DeleteOutcome::Missing);
            };
            let used = tx.opt_i64(
                "SELECT 1 FROM targets
                 WHERE lsc_credential = ?1 OR smb_lsc_credential = ?1 LIMIT 1",
                params![rid],
            )?;
            if used.is_some() {
                return Ok(DeleteOutcome::InUse);
            }
            tx.exec("DELETE FROM lsc_credentials WHERE rid = ?1", params![rid])?;
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

    use super::CredentialPackages;
    use super::NewCredential;
    use crate::outcome::CreateOutcome;
    use crate::outcome::DeleteOutcome;
    use crate::targets::NewTarget;
    use crate::tests_support::initialized_manage;
    use crate::tests_support::login;

    fn password_credential() -> NewCredential {
        NewCredential {
            name: "scan account".to_string(),
            login: "scanner".to_string(),
            password: Some("secret".to_string()),
            ..NewCredential::default()
        }
    }

    #[test]
    fn password_only_and_key_pair_forms_are_accepted() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        assert!(matches!(
            manage.create_credential(&password_credential()).unwrap(),
            CreateOutcome::Created(_)
        ));
        let keyed = NewCredential {
            name: "keyed account".to_string(),
            login: "scanner".to_string(),
            public_key: Some("ssh-rsa AAAA".to_string()),
            private_key: Some("-----BEGIN".to_string()),
            ..NewCredential::default()
        };
        assert!(matches!(
            manage.create_credential(&keyed).unwrap(),
            CreateOutcome::Created(_)
        ));
    }

    #[test]
    fn half_a_key_pair_is_invalid() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let half = NewCredential {
            name: "broken".to_string(),
            login: "scanner".to_string(),
            public_key: Some("ssh-rsa AAAA".to_string()),
            ..NewCredential::default()
        };
        assert_eq!(manage.create_credential(&half).unwrap(), CreateOutcome::InvalidInput);
    }

    #[test]
    fn packages_round_trip() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let CreateOutcome::Created(uuid) =
            manage.create_credential(&password_credential()).unwrap()
        else {
            panic!("expected create");
        };
        let packages = CredentialPackages {
            rpm: Some(b"rpm-bytes".to_vec()),
            deb: Some(b"deb-bytes".to_vec()),
            exe: None,
        };
        manage.set_credential_packages(uuid.as_str(), &packages).unwrap();
        assert_eq!(manage.credential_packages(uuid.as_str()).unwrap(), Some(packages));
    }

    #[test]
    fn referencing_target_blocks_delete() {
        let mut manage = initialized_manage();
        login(&mut manage, "alice");
        let CreateOutcome::Created(credential_uuid) =
            manage.create_credential(&password_credential()).unwrap()
        else {
            panic!("expected create");
        };
        let target = NewTarget {
            name: "with credential".to_string(),
            hosts: "10.0.0.1".to_string(),
            lsc_credential: Some(credential_uuid.as_str().to_string()),
            ..NewTarget::default()
        };
        assert!(matches!(
            manage.create_target(&target).unwrap(),
            CreateOutcome::Created(_)
        ));
        assert_eq!(
            manage.delete_credential(credential_uuid.as_str()).unwrap(),
            DeleteOutcome::InUse
        );
        assert_eq!(manage.credential_in_use(credential_uuid.as_str()).unwrap(), Some(true));
    }
}
