// ABOUTME: The persistence contract shared by every backend, plus its error type and lookup modes.
// ABOUTME: Also owns the key-locator fingerprint policy used by the index.

use ndnrepo_core::{Data, KeyLocator, Name, TlvError};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::index::IndexError;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot store data with an empty name")]
    EmptyName,

    #[error("data already stored under {0}")]
    DuplicateName(Name),

    #[error("data has no key locator")]
    NoKeyLocator,

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("decode error: {0}")]
    Decode(#[from] TlvError),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// How `find` compares the query name against stored full names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The stored full name must equal the query.
    Exact,
    /// The query must be a component-wise prefix of the stored full name.
    Prefix,
}

/// A row located by `find`. Only the stored name is decoded, so rows with
/// unreadable data can still be located and erased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub id: i64,
    pub name: Name,
}

/// A store of Data packets keyed by full name.
pub trait Storage: Send {
    /// Persist `data`, returning its backend id.
    fn insert(&mut self, data: &Data) -> Result<i64, StorageError>;

    /// Remove the object stored under exactly `full_name`.
    fn erase(&mut self, full_name: &Name) -> Result<bool, StorageError>;

    /// The first decodable object whose full name starts with `name`.
    ///
    /// Rows whose data fails to decode are skipped, not reported.
    fn read(&self, name: &Name) -> Result<Option<Data>, StorageError>;

    /// Whether an object is stored under exactly `full_name`.
    fn has(&self, full_name: &Name) -> Result<bool, StorageError>;

    fn find(&self, name: &Name, mode: MatchMode) -> Result<Option<Found>, StorageError>;

    fn size(&self) -> Result<i64, StorageError>;
}

/// SHA-256 over the wire encoding of a key locator.
pub fn key_locator_hash(locator: &KeyLocator) -> [u8; 32] {
    Sha256::digest(locator.wire_encode()).into()
}

/// Fingerprint of the key that signed `data`.
pub fn key_locator_fingerprint(data: &Data) -> Result<[u8; 32], StorageError> {
    data.signature_info()
        .key_locator
        .as_ref()
        .map(key_locator_hash)
        .ok_or(StorageError::NoKeyLocator)
}
