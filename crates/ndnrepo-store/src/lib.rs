// ABOUTME: Persistence layer for ndnrepo, storing Data packets and indexing them by full name.
// ABOUTME: Provides the Storage contract, SQLite and in-memory backends, and the repository facade.

pub mod index;
pub mod memory;
pub mod repo_storage;
pub mod sqlite;
pub mod storage;

pub use index::{Index, IndexEntry, IndexError};
pub use memory::MemoryStorage;
pub use repo_storage::{DeleteOutcome, InsertOutcome, RepoError, RepoEvent, RepoStorage, SharedRepo};
pub use sqlite::{DB_FILE_NAME, SqliteStorage};
pub use storage::{Found, MatchMode, Storage, StorageError, key_locator_fingerprint, key_locator_hash};
