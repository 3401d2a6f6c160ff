//! SQLite-backed record store.
//!
//! One database file holds two separate namespaces: user filesets (the
//! `filesets` and `records` tables) and fileset signatures (the `signatures`
//! table). Keys are absolute path strings; values are the serialized
//! [`BaselineRecord`] bytes, kept byte-exact so signatures stay reproducible.
//!
//! Transactions are tracked by the store itself: at most one is open, and
//! every operation checks the mode it needs before touching the database.

use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fileset::FilesetName;
use crate::record::{BaselineRecord, Entry};

const SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    Read,
    Write,
}

pub struct Store {
    conn: Connection,
    tx: Option<TxMode>,
}

impl Store {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        restrict_file_permissions(path);
        Self::init(conn)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self { conn, tx: None };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < 1 {
            self.conn.execute_batch(
                r#"
                BEGIN;
                CREATE TABLE IF NOT EXISTS filesets (
                    name TEXT PRIMARY KEY NOT NULL
                ) WITHOUT ROWID;

                CREATE TABLE IF NOT EXISTS records (
                    fileset TEXT NOT NULL REFERENCES filesets(name) ON DELETE CASCADE,
                    path TEXT NOT NULL,
                    value BLOB NOT NULL,
                    PRIMARY KEY (fileset, path)
                ) WITHOUT ROWID;

                CREATE TABLE IF NOT EXISTS signatures (
                    fileset TEXT PRIMARY KEY NOT NULL,
                    envelope BLOB NOT NULL
                ) WITHOUT ROWID;

                PRAGMA user_version = 1;
                COMMIT;
                "#,
            )?;
            debug!(version = SCHEMA_VERSION, "store schema created");
        }
        Ok(())
    }

    // ── Transactions ────────────────────────────────────────────────────────

    pub fn begin(&mut self, write: bool) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::NestedTransaction);
        }
        let (mode, sql) = if write {
            (TxMode::Write, "BEGIN IMMEDIATE")
        } else {
            (TxMode::Read, "BEGIN DEFERRED")
        };
        self.conn.execute_batch(sql)?;
        self.tx = Some(mode);
        Ok(())
    }

    /// Commit the open transaction. The transaction is gone afterwards even
    /// when the commit fails.
    pub fn commit(&mut self) -> Result<()> {
        self.tx.take().ok_or(Error::TransactionRequired)?;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            if !self.conn.is_autocommit() {
                let _ = self.conn.execute_batch("ROLLBACK");
            }
            return Err(e.into());
        }
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.tx.take().ok_or(Error::TransactionRequired)?;
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    pub fn transaction(&self) -> Option<TxMode> {
        self.tx
    }

    /// Close the store. Fails, handing the store back, while a transaction
    /// is still open.
    pub fn close(self) -> std::result::Result<(), (Store, Error)> {
        if self.tx.is_some() {
            return Err((self, Error::TransactionForbidden));
        }
        self.conn.close().map_err(|(conn, e)| {
            (
                Store { conn, tx: None },
                Error::Database(e),
            )
        })
    }

    fn require_tx(&self) -> Result<()> {
        match self.tx {
            Some(_) => Ok(()),
            None => Err(Error::TransactionRequired),
        }
    }

    fn require_write(&self) -> Result<()> {
        match self.tx {
            Some(TxMode::Write) => Ok(()),
            Some(TxMode::Read) => Err(Error::WriteTransactionRequired),
            None => Err(Error::TransactionRequired),
        }
    }

    // ── Filesets ────────────────────────────────────────────────────────────

    fn fileset_exists(&self, fileset: &FilesetName) -> Result<bool> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM filesets WHERE name = ?1",
                params![fileset.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    fn require_fileset(&self, fileset: &FilesetName) -> Result<()> {
        if self.fileset_exists(fileset)? {
            Ok(())
        } else {
            Err(Error::UnknownFileset(fileset.to_string()))
        }
    }

    /// Whether `path` has a record in `fileset`. Fails for an unknown fileset.
    pub fn has(&self, path: &str, fileset: &FilesetName) -> Result<bool> {
        self.require_tx()?;
        self.require_fileset(fileset)?;
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM records WHERE fileset = ?1 AND path = ?2",
                params![fileset.as_str(), path],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }

    /// Store `record` under `path`, creating the fileset when needed.
    pub fn add(
        &self,
        path: &str,
        record: &BaselineRecord,
        fileset: &FilesetName,
        overwrite: bool,
    ) -> Result<()> {
        self.require_write()?;
        let value = record.to_bytes()?;
        self.conn.execute(
            "INSERT OR IGNORE INTO filesets (name) VALUES (?1)",
            params![fileset.as_str()],
        )?;
        if !overwrite && self.has(path, fileset)? {
            return Err(Error::RecordExists {
                path: path.to_string(),
            });
        }
        self.conn.execute(
            "INSERT INTO records (fileset, path, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (fileset, path) DO UPDATE SET value = excluded.value",
            params![fileset.as_str(), path, value],
        )?;
        Ok(())
    }

    /// Remove the record for `path`. With `skip_missing` a missing record (or
    /// fileset) is not an error.
    pub fn delete(&self, path: &str, fileset: &FilesetName, skip_missing: bool) -> Result<()> {
        self.require_write()?;
        if !self.fileset_exists(fileset)? {
            if skip_missing {
                return Ok(());
            }
            return Err(Error::UnknownFileset(fileset.to_string()));
        }
        let removed = self.conn.execute(
            "DELETE FROM records WHERE fileset = ?1 AND path = ?2",
            params![fileset.as_str(), path],
        )?;
        if removed == 0 && !skip_missing {
            return Err(Error::PathNotFound {
                path: path.to_string(),
                fileset: fileset.to_string(),
            });
        }
        Ok(())
    }

    pub fn list(&self, fileset: &FilesetName) -> Result<Vec<Entry>> {
        self.query_by_prefix(fileset, "")
    }

    /// Entries whose path starts with `prefix`, in key order. Fails on the
    /// first value that does not decode.
    pub fn query_by_prefix(&self, fileset: &FilesetName, prefix: &str) -> Result<Vec<Entry>> {
        self.query_raw_by_prefix(fileset, prefix)?
            .into_iter()
            .map(|(path, value)| match BaselineRecord::from_bytes(&value) {
                Ok(record) => Ok(Entry { path, record }),
                Err(source) => Err(Error::CorruptRecord { path, source }),
            })
            .collect()
    }

    /// Undecoded `(path, value)` pairs whose path starts with `prefix`, in
    /// key order.
    pub fn query_raw_by_prefix(
        &self,
        fileset: &FilesetName,
        prefix: &str,
    ) -> Result<Vec<(String, Vec<u8>)>> {
        self.require_tx()?;
        self.require_fileset(fileset)?;
        let mut stmt = self.conn.prepare(
            "SELECT path, value FROM records
             WHERE fileset = ?1 AND path >= ?2 ORDER BY path",
        )?;
        let mut rows = stmt.query(params![fileset.as_str(), prefix])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let path: String = row.get(0)?;
            if !path.starts_with(prefix) {
                break;
            }
            result.push((path, row.get(1)?));
        }
        Ok(result)
    }

    /// Names of all user filesets, sorted.
    pub fn list_fileset_names(&self) -> Result<Vec<FilesetName>> {
        self.require_tx()?;
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM filesets ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names
            .into_iter()
            .filter_map(|name| FilesetName::new(name).ok())
            .collect())
    }

    /// Drop a fileset and all of its records.
    pub fn delete_fileset(&self, fileset: &FilesetName) -> Result<()> {
        self.require_write()?;
        self.require_fileset(fileset)?;
        self.conn.execute(
            "DELETE FROM records WHERE fileset = ?1",
            params![fileset.as_str()],
        )?;
        self.conn.execute(
            "DELETE FROM filesets WHERE name = ?1",
            params![fileset.as_str()],
        )?;
        Ok(())
    }

    /// Duplicate every key/value pair of `src` into a new fileset `dst`.
    pub fn copy_fileset(&self, src: &FilesetName, dst: &FilesetName) -> Result<()> {
        self.require_write()?;
        self.require_fileset(src)?;
        if self.fileset_exists(dst)? {
            return Err(Error::FilesetExists(dst.to_string()));
        }
        self.conn.execute(
            "INSERT INTO filesets (name) VALUES (?1)",
            params![dst.as_str()],
        )?;
        let copied = self.conn.execute(
            "INSERT INTO records (fileset, path, value)
             SELECT ?1, path, value FROM records WHERE fileset = ?2",
            params![dst.as_str(), src.as_str()],
        )?;
        debug!(src = %src, dst = %dst, copied, "fileset copied");
        Ok(())
    }

    /// Feed every raw key/value pair of `fileset` to `visit`, in key order.
    /// The values are not interpreted.
    pub fn for_each_raw<F>(&self, fileset: &FilesetName, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]),
    {
        self.require_tx()?;
        self.require_fileset(fileset)?;
        let mut stmt = self
            .conn
            .prepare("SELECT path, value FROM records WHERE fileset = ?1 ORDER BY path")?;
        let mut rows = stmt.query(params![fileset.as_str()])?;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let value: Vec<u8> = row.get(1)?;
            visit(key.as_bytes(), &value);
        }
        Ok(())
    }

    // ── Signatures ──────────────────────────────────────────────────────────

    pub fn signature(&self, fileset: &FilesetName) -> Result<Option<Vec<u8>>> {
        self.require_tx()?;
        Ok(self
            .conn
            .query_row(
                "SELECT envelope FROM signatures WHERE fileset = ?1",
                params![fileset.as_str()],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn put_signature(&self, fileset: &FilesetName, envelope: &[u8]) -> Result<()> {
        self.require_write()?;
        self.conn.execute(
            "INSERT INTO signatures (fileset, envelope) VALUES (?1, ?2)
             ON CONFLICT (fileset) DO UPDATE SET envelope = excluded.envelope",
            params![fileset.as_str(), envelope],
        )?;
        Ok(())
    }
}

fn restrict_file_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!("cannot restrict permissions on {}: {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
