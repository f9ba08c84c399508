// crates/scan-manager-store/src/store.rs
// ============================================================================
// Module: Embedded Store Handle
// Description: Single-writer SQLite connection with scoped transactions.
// Purpose: Provide exclusive/immediate transactions with BUSY retry, typed
//          scalar queries, row mapping, and the registered SQL functions
//          and collations the repositories rely on.
// Dependencies: rusqlite, scan-manager-core, thiserror
// ============================================================================

//! ## Overview
//! The store assumes a single writer process with cooperative readers.
//! Writers take exclusive transactions; multi-statement reads take
//! immediate transactions. BUSY at transaction begin is retried
//! indefinitely with a short sleep. Malformed SQL and missing required rows
//! are programming errors surfaced as [`StoreError`] values the top level
//! treats as fatal. All string data is bound, never interpolated; binary
//! columns are bound as blobs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::path::Path;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::Params;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::functions::FunctionFlags;
use scan_manager_core::EntityUuid;
use scan_manager_core::hosts_contains;
use scan_manager_core::MessageType;
use scan_manager_core::ThreatLevel;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Backoff applied between BUSY retries.
const BUSY_BACKOFF: Duration = Duration::from_millis(50);

/// SQLite-level busy timeout applied to the connection.
const BUSY_TIMEOUT: Duration = Duration::from_millis(500);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Store failure.
///
/// # Invariants
/// - `Sql` and `MissingRow` indicate programming errors; correct code never
///   produces them and the top-level caller aborts on them.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The database file could not be opened or configured.
    #[error("store open failed: {0}")]
    Open(String),
    /// A statement failed to prepare or step.
    #[error("sql error in `{statement}`: {message}")]
    Sql {
        /// Statement fingerprint (leading fragment).
        statement: String,
        /// Engine error message.
        message: String,
    },
    /// A query required a row that was not present.
    #[error("required row missing for `{0}`")]
    MissingRow(String),
}

/// Truncates a statement for error fingerprints.
fn fingerprint(sql: &str) -> String {
    const LIMIT: usize = 80;
    if sql.len() <= LIMIT {
        sql.to_string()
    } else {
        let mut cut = LIMIT;
        while !sql.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &sql[.. cut])
    }
}

/// Maps an engine error for `sql` into a [`StoreError`].
fn sql_error(sql: &str, err: &rusqlite::Error) -> StoreError {
    StoreError::Sql {
        statement: fingerprint(sql),
        message: err.to_string(),
    }
}

/// Whether an engine error is BUSY/LOCKED contention.
fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::DatabaseBusy
                || failure.code == ErrorCode::DatabaseLocked
    )
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Handle on the embedded store.
///
/// # Invariants
/// - Exactly one `Store` performs writes per database file at a time.
/// - Scalar functions and collations are registered before any caller can
///   run a statement.
pub struct Store {
    /// The underlying connection.
    conn: Connection,
    /// On-disk path; `None` for in-memory test stores.
    path: Option<PathBuf>,
}

impl Store {
    /// Opens (creating if needed) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] when the file cannot be opened or the
    /// connection cannot be configured.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|err| StoreError::Open(err.to_string()))?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.configure()?;
        Ok(store)
    }

    /// Opens a fresh in-memory store. Test and tooling use only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] when the connection cannot be
    /// configured.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|err| StoreError::Open(err.to_string()))?;
        let store = Self {
            conn,
            path: None,
        };
        store.configure()?;
        Ok(store)
    }

    /// Returns the on-disk path, when the store is file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Applies pragmas and registers functions and collations.
    fn configure(&self) -> Result<(), StoreError> {
        self.conn
            .busy_timeout(BUSY_TIMEOUT)
            .map_err(|err| StoreError::Open(err.to_string()))?;
        let _mode: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|err| StoreError::Open(err.to_string()))?;
        register_functions(&self.conn)?;
        register_collations(&self.conn)?;
        Ok(())
    }

    /// Runs `f` inside an exclusive transaction; commits iff `f` succeeds.
    /// BUSY at begin is retried indefinitely.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a [`StoreError`] from begin/commit.
    pub fn exclusive<T, E>(
        &mut self,
        f: impl FnOnce(&Tx<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.transact(TransactionBehavior::Exclusive, f)
    }

    /// Runs `f` inside an immediate transaction; commits iff `f` succeeds.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or a [`StoreError`] from begin/commit.
    pub fn immediate<T, E>(
        &mut self,
        f: impl FnOnce(&Tx<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        self.transact(TransactionBehavior::Immediate, f)
    }

    /// Shared transaction driver.
    fn transact<T, E>(
        &mut self,
        behavior: TransactionBehavior,
        f: impl FnOnce(&Tx<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let tx = loop {
            match self.conn.transaction_with_behavior(behavior) {
                Ok(tx) => break tx,
                Err(err) if is_busy(&err) => thread::sleep(BUSY_BACKOFF),
                Err(err) => return Err(E::from(sql_error("BEGIN", &err))),
            }
        };
        let handle = Tx {
            inner: &tx,
        };
        let value = f(&handle)?;
        tx.commit().map_err(|err| E::from(sql_error("COMMIT", &err)))?;
        Ok(value)
    }

    /// Executes a statement batch outside any transaction. Used for
    /// `ANALYZE` and `VACUUM` after migration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sql`] on any statement failure.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.conn.execute_batch(sql).map_err(|err| sql_error(sql, &err))
    }
}

// ============================================================================
// SECTION: Transaction Handle
// ============================================================================

/// Statement interface handed to transaction closures.
pub struct Tx<'conn> {
    /// The open transaction.
    inner: &'conn rusqlite::Transaction<'conn>,
}

impl Tx<'_> {
    /// Executes a statement, returning the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sql`] on prepare or step failure.
    pub fn exec(&self, sql: &str, params: impl Params) -> Result<usize, StoreError> {
        self.inner.execute(sql, params).map_err(|err| sql_error(sql, &err))
    }

    /// Executes a multi-statement batch (DDL).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sql`] on any statement failure.
    pub fn exec_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.inner.execute_batch(sql).map_err(|err| sql_error(sql, &err))
    }

    /// Returns the first column of the first row as an integer. The row
    /// must exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRow`] when no row matches and
    /// [`StoreError::Sql`] on engine failure.
    pub fn scalar_i64(&self, sql: &str, params: impl Params) -> Result<i64, StoreError> {
        self.opt_i64(sql, params)?.ok_or_else(|| StoreError::MissingRow(fingerprint(sql)))
    }

    /// Returns the first column of the first row as an integer, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sql`] on engine failure.
    pub fn opt_i64(&self, sql: &str, params: impl Params) -> Result<Option<i64>, StoreError> {
        match self.inner.query_row(sql, params, |row| row.get::<_, i64>(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(sql_error(sql, &err)),
        }
    }

    /// Returns the first column of the first row as text. The row must
    /// exist; a NULL cell maps to the empty string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingRow`] when no row matches and
    /// [`StoreError::Sql`] on engine failure.
    pub fn scalar_string(&self, sql: &str, params: impl Params) -> Result<String, StoreError> {
        self.opt_string(sql, params)?
            .ok_or_else(|| StoreError::MissingRow(fingerprint(sql)))
    }

    /// Returns the first column of the first row as text, or `None` when no
    /// row matches. A NULL cell maps to the empty string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sql`] on engine failure.
    pub fn opt_string(
        &self,
        sql: &str,
        params: impl Params,
    ) -> Result<Option<String>, StoreError> {
        let mapped = self
            .inner
            .query_row(sql, params, |row| row.get::<_, Option<String>>(0));
        match mapped {
            Ok(value) => Ok(Some(value.unwrap_or_default())),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(sql_error(sql, &err)),
        }
    }

    /// Runs a query and maps every row through `map`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sql`] on prepare, step, or mapping failure.
    pub fn rows<T>(
        &self,
        sql: &str,
        params: impl Params,
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, StoreError> {
        let mut statement = self.inner.prepare(sql).map_err(|err| sql_error(sql, &err))?;
        let mapped = statement.query_map(params, map).map_err(|err| sql_error(sql, &err))?;
        let mut out = Vec::new();
        for row in mapped {
            out.push(row.map_err(|err| sql_error(sql, &err))?);
        }
        Ok(out)
    }

    /// Returns the rowid assigned by the most recent insert.
    #[must_use]
    pub fn last_insert_rid(&self) -> i64 {
        self.inner.last_insert_rowid()
    }
}

// ============================================================================
// SECTION: Registered Functions
// ============================================================================

/// Registers the SQL scalar functions `make_uuid` and `hosts_contains`.
///
/// `uniquify` intentionally has no SQL counterpart: name uniquification is
/// a repository-layer materialization pass, keeping the store engine
/// replaceable.
fn register_functions(conn: &Connection) -> Result<(), StoreError> {
    conn.create_scalar_function("make_uuid", 0, FunctionFlags::SQLITE_UTF8, |_ctx| {
        Ok(EntityUuid::generate().as_str().to_string())
    })
    .map_err(|err| StoreError::Open(err.to_string()))?;
    conn.create_scalar_function(
        "hosts_contains",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let hosts = ctx.get::<String>(0)?;
            let host = ctx.get::<String>(1)?;
            Ok(i64::from(hosts_contains(&hosts, &host)))
        },
    )
    .map_err(|err| StoreError::Open(err.to_string()))
}

// ============================================================================
// SECTION: Registered Collations
// ============================================================================

/// Registers the severity, threat, and IP collations.
fn register_collations(conn: &Connection) -> Result<(), StoreError> {
    conn.create_collation("collate_message_type", |a, b| MessageType::collate(a, b))
        .map_err(|err| StoreError::Open(err.to_string()))?;
    conn.create_collation("collate_threat", |a, b| ThreatLevel::collate(a, b))
        .map_err(|err| StoreError::Open(err.to_string()))?;
    conn.create_collation("collate_ip", collate_ip)
        .map_err(|err| StoreError::Open(err.to_string()))
}

/// Sort key classes for the IP collation.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum IpKey {
    /// Parseable IPv4 address, ordered numerically.
    V4(u32),
    /// Parseable IPv6 address, ordered on the 16-byte form.
    V6(u128),
    /// Unparseable text, ordered bytewise after all addresses.
    Other,
}

/// Classifies one collation operand.
fn ip_key(text: &str) -> IpKey {
    if let Ok(v4) = text.parse::<Ipv4Addr>() {
        return IpKey::V4(u32::from(v4));
    }
    if let Ok(v6) = text.parse::<Ipv6Addr>() {
        return IpKey::V6(u128::from(v6));
    }
    IpKey::Other
}

/// Total order over host strings: IPv4 numerically, then IPv6
/// byte-lexicographically on the parsed address, then plain text bytewise.
fn collate_ip(left: &str, right: &str) -> Ordering {
    match (ip_key(left), ip_key(right)) {
        (IpKey::Other, IpKey::Other) => left.cmp(right),
        (a, b) => a.cmp(&b),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use rusqlite::params;

    use super::Store;
    use super::StoreError;

    fn test_store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store
            .exclusive(|tx| {
                tx.exec_batch("CREATE TABLE things (rid INTEGER PRIMARY KEY, name TEXT);")
            })
            .unwrap();
        store
    }

    #[test]
    fn commit_persists_and_rollback_discards() {
        let mut store = test_store();
        store
            .exclusive(|tx| tx.exec("INSERT INTO things (name) VALUES (?1)", params!["kept"]))
            .unwrap();
        let failed: Result<(), StoreError> = store.exclusive(|tx| {
            tx.exec("INSERT INTO things (name) VALUES (?1)", params!["dropped"])?;
            Err(StoreError::MissingRow("forced".to_string()))
        });
        assert!(failed.is_err());
        let count = store
            .immediate(|tx| tx.scalar_i64("SELECT count(*) FROM things", []))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn missing_required_row_is_reported() {
        let mut store = test_store();
        let result: Result<i64, StoreError> = store
            .immediate(|tx| tx.scalar_i64("SELECT rid FROM things WHERE name = 'absent'", []));
        assert!(matches!(result, Err(StoreError::MissingRow(_))));
    }

    #[test]
    fn make_uuid_yields_canonical_uuids() {
        let mut store = test_store();
        let id = store.immediate(|tx| tx.scalar_string("SELECT make_uuid()", [])).unwrap();
        assert_eq!(id.len(), 36);
        let other = store.immediate(|tx| tx.scalar_string("SELECT make_uuid()", [])).unwrap();
        assert_ne!(id, other);
    }

    #[test]
    fn hosts_contains_matches_list_entries() {
        let mut store = test_store();
        let hit = store
            .immediate(|tx| {
                tx.scalar_i64(
                    "SELECT hosts_contains('10.0.0.1, 10.0.0.2', '10.0.0.2')",
                    [],
                )
            })
            .unwrap();
        assert_eq!(hit, 1);
        let miss = store
            .immediate(|tx| {
                tx.scalar_i64("SELECT hosts_contains('10.0.0.1', '10.0.0.2')", [])
            })
            .unwrap();
        assert_eq!(miss, 0);
    }

    #[test]
    fn message_type_collation_sorts_most_severe_first() {
        let mut store = test_store();
        store
            .exclusive(|tx| {
                tx.exec_batch(
                    "INSERT INTO things (name) VALUES ('Log Message');
                     INSERT INTO things (name) VALUES ('Security Hole');
                     INSERT INTO things (name) VALUES ('Security Warning');",
                )
            })
            .unwrap();
        let first = store
            .immediate(|tx| {
                tx.scalar_string(
                    "SELECT name FROM things ORDER BY name COLLATE collate_message_type LIMIT 1",
                    [],
                )
            })
            .unwrap();
        assert_eq!(first, "Security Hole");
    }

    #[test]
    fn ip_collation_orders_v4_numerically_before_v6_and_text() {
        let mut store = test_store();
        store
            .exclusive(|tx| {
                tx.exec_batch(
                    "INSERT INTO things (name) VALUES ('10.0.0.9');
                     INSERT INTO things (name) VALUES ('10.0.0.10');
                     INSERT INTO things (name) VALUES ('::1');
                     INSERT INTO things (name) VALUES ('gateway');",
                )
            })
            .unwrap();
        let ordered = store
            .immediate(|tx| {
                tx.rows(
                    "SELECT name FROM things ORDER BY name COLLATE collate_ip",
                    [],
                    |row| row.get::<_, String>(0),
                )
            })
            .unwrap();
        assert_eq!(ordered, vec!["10.0.0.9", "10.0.0.10", "::1", "gateway"]);
    }
}
