// ABOUTME: Durable SQLite backend storing each Data packet as a row keyed by its encoded full name.
// ABOUTME: Keeps an in-memory Index in step with the table and rebuilds it from disk on open.

use std::path::Path;

use ndnrepo_core::{Data, Name};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::index::{Index, IndexError};
use crate::storage::{Found, MatchMode, Storage, StorageError, key_locator_fingerprint};

/// File name of the database inside the configured directory.
pub const DB_FILE_NAME: &str = "ndn_repo.db";

type Row = (i64, Vec<u8>, Vec<u8>);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

/// A single-connection SQLite store.
///
/// The connection runs in WAL mode with `synchronous=OFF`: commits reach the
/// OS page cache but are not fsynced, so a power loss can drop the most recent
/// writes. Process crashes do not lose committed rows.
pub struct SqliteStorage {
    conn: Connection,
    index: Index,
}

impl SqliteStorage {
    /// Open or create `ndn_repo.db` under `dir`, creating the directory if needed.
    pub fn open(dir: &Path, max_packets: usize) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DB_FILE_NAME);
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=OFF;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS NDN_REPO (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name BLOB NOT NULL UNIQUE,
                data BLOB NOT NULL
            );",
        )?;

        let index = load_index(&conn, max_packets)?;
        info!(path = %path.display(), entries = index.size(), "opened sqlite storage");
        Ok(Self { conn, index })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Fetch and decode the row with the given id.
    pub fn read_by_id(&self, id: i64) -> Result<Option<Data>, StorageError> {
        let wire: Option<Vec<u8>> = self
            .conn
            .query_row("SELECT data FROM NDN_REPO WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(wire.and_then(|wire| match Data::wire_decode(&wire) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(id, error = %e, "stored row failed to decode");
                None
            }
        }))
    }

    /// Delete the row with the given id and drop its index entry.
    pub fn erase_by_id(&mut self, id: i64) -> Result<bool, StorageError> {
        let name: Option<Vec<u8>> = self
            .conn
            .query_row("SELECT name FROM NDN_REPO WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(name) = name else {
            return Ok(false);
        };
        self.conn
            .execute("DELETE FROM NDN_REPO WHERE id = ?1", params![id])?;
        if let Ok(full_name) = Name::decode_value(&name) {
            self.index.erase(&full_name);
        }
        Ok(true)
    }

    /// Walk rows whose full name starts with `prefix`, in name order, until `accept` returns a value.
    ///
    /// Rows whose stored name does not decode are logged and skipped. When
    /// `with_data` is false the data column is not read.
    fn scan_prefix<T>(
        &self,
        prefix: &Name,
        with_data: bool,
        mut accept: impl FnMut(i64, Name, Option<Vec<u8>>) -> Option<T>,
    ) -> Result<Option<T>, StorageError> {
        let columns = if with_data { "id, name, data" } else { "id, name" };
        let mut bounds = Vec::new();
        let filter = if prefix.is_empty() {
            ""
        } else {
            bounds.push(prefix.encode_value());
            bounds.push(prefix.successor().encode_value());
            "WHERE name >= ?1 AND name < ?2"
        };
        let sql = format!("SELECT {columns} FROM NDN_REPO {filter} ORDER BY name ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(bounds.iter()))?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let name_bytes: Vec<u8> = row.get(1)?;
            let wire: Option<Vec<u8>> = if with_data { Some(row.get(2)?) } else { None };
            let name = match Name::decode_value(&name_bytes) {
                Ok(name) => name,
                Err(e) => {
                    warn!(id, error = %e, "stored name failed to decode, skipping row");
                    continue;
                }
            };
            if !prefix.is_prefix_of(&name) {
                debug!(%prefix, candidate = %name, "range scan candidate is not a prefix match");
                continue;
            }
            if let Some(found) = accept(id, name, wire) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

fn load_index(conn: &Connection, max_packets: usize) -> Result<Index, StorageError> {
    let mut index = Index::new(max_packets);
    let mut stmt = conn.prepare("SELECT id, name, data FROM NDN_REPO")?;
    let rows = stmt.query_map([], read_row)?;
    for row in rows {
        let (id, name_bytes, wire) = row?;
        let decoded = Name::decode_value(&name_bytes)
            .and_then(|name| Data::wire_decode(&wire).map(|data| (name, data)));
        let (name, data) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(id, error = %e, "skipping undecodable row while rebuilding index");
                continue;
            }
        };
        index.insert_entry(name, id, key_locator_fingerprint(&data).ok())?;
    }
    Ok(index)
}

impl Storage for SqliteStorage {
    fn insert(&mut self, data: &Data) -> Result<i64, StorageError> {
        if data.name().is_empty() {
            return Err(StorageError::EmptyName);
        }
        if self.index.is_full() {
            return Err(IndexError::Full {
                capacity: self.index.capacity(),
            }
            .into());
        }

        let full_name = data.full_name();
        let result = self.conn.execute(
            "INSERT INTO NDN_REPO (name, data) VALUES (?1, ?2)",
            params![full_name.encode_value(), data.wire_encode()],
        );
        match result {
            Ok(_) => {}
            Err(e) if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) => {
                return Err(StorageError::DuplicateName(full_name));
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        if !self.index.insert(data, id)? {
            warn!(%full_name, id, "row inserted but index already held the name");
        }
        debug!(%full_name, id, "inserted");
        Ok(id)
    }

    fn erase(&mut self, full_name: &Name) -> Result<bool, StorageError> {
        let changed = self.conn.execute(
            "DELETE FROM NDN_REPO WHERE name = ?1",
            params![full_name.encode_value()],
        )?;
        self.index.erase(full_name);
        Ok(changed > 0)
    }

    fn has(&self, full_name: &Name) -> Result<bool, StorageError> {
        Ok(self.index.has_name(full_name))
    }

    fn read(&self, name: &Name) -> Result<Option<Data>, StorageError> {
        self.scan_prefix(name, true, |id, found, wire| {
            match Data::wire_decode(wire.as_deref()?) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!(id, name = %found, error = %e, "stored data failed to decode, skipping row");
                    None
                }
            }
        })
    }

    fn find(&self, name: &Name, mode: MatchMode) -> Result<Option<Found>, StorageError> {
        match mode {
            MatchMode::Exact => {
                let id: Option<i64> = self
                    .conn
                    .query_row(
                        "SELECT id FROM NDN_REPO WHERE name = ?1",
                        params![name.encode_value()],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(id.map(|id| Found {
                    id,
                    name: name.clone(),
                }))
            }
            MatchMode::Prefix => {
                self.scan_prefix(name, false, |id, found, _| Some(Found { id, name: found }))
            }
        }
    }

    fn size(&self) -> Result<i64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM NDN_REPO", [], |row| row.get(0))?;
        if count != self.index.size() as i64 {
            warn!(rows = count, indexed = self.index.size(), "index and table sizes disagree");
        }
        Ok(count)
    }
}
