// ABOUTME: Repository facade over a Storage backend: idempotent insert, multi-variant delete, prefix read.
// ABOUTME: Broadcasts insert and delete events to subscribers after each successful mutation.

use std::sync::Arc;

use ndnrepo_core::{Data, Interest, Name};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, warn};

use crate::storage::{MatchMode, Storage, StorageError};

/// The facade shared by every handler in the process.
pub type SharedRepo = Arc<Mutex<RepoStorage>>;

/// Errors surfaced by the facade.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("failed to insert {name}: {source}")]
    Insert {
        name: Name,
        #[source]
        source: StorageError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Notifications sent after a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoEvent {
    Inserted { name: Name },
    Deleted { name: Name },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { id: i64 },
    /// The exact full name was already stored; nothing was written.
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Every matching object was erased.
    Erased(u64),
    /// At least one erase failed; `erased` objects were removed before it.
    Failed { erased: u64 },
}

impl DeleteOutcome {
    /// The erased count, or -1 if any erase failed.
    pub fn count(&self) -> i64 {
        match self {
            DeleteOutcome::Erased(n) => *n as i64,
            DeleteOutcome::Failed { .. } => -1,
        }
    }
}

pub struct RepoStorage {
    storage: Box<dyn Storage>,
    event_tx: broadcast::Sender<RepoEvent>,
}

impl RepoStorage {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self { storage, event_tx }
    }

    pub fn into_shared(self) -> SharedRepo {
        Arc::new(Mutex::new(self))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RepoEvent> {
        self.event_tx.subscribe()
    }

    /// Store `data` unless its full name is already present.
    ///
    /// Backend failures other than a duplicate name are returned as `RepoError::Insert`.
    pub fn insert_data(&mut self, data: &Data) -> Result<InsertOutcome, RepoError> {
        let full_name = data.full_name();
        if self.storage.has(&full_name)? {
            debug!(%full_name, "data already stored, treating insert as successful");
            return Ok(InsertOutcome::AlreadyPresent);
        }

        match self.storage.insert(data) {
            Ok(id) => {
                debug!(%full_name, id, "inserted data");
                let _ = self.event_tx.send(RepoEvent::Inserted {
                    name: data.name().clone(),
                });
                Ok(InsertOutcome::Inserted { id })
            }
            Err(StorageError::DuplicateName(_)) => Ok(InsertOutcome::AlreadyPresent),
            Err(source) => {
                error!(%full_name, error = %source, "insert rejected by storage");
                Err(RepoError::Insert {
                    name: full_name,
                    source,
                })
            }
        }
    }

    /// Erase every stored object whose full name starts with `name`.
    pub fn delete_data(&mut self, name: &Name) -> DeleteOutcome {
        let mut erased = 0u64;
        loop {
            let found = match self.storage.find(name, MatchMode::Prefix) {
                Ok(Some(found)) => found,
                Ok(None) => break,
                Err(e) => {
                    warn!(%name, error = %e, "lookup failed during delete");
                    return DeleteOutcome::Failed { erased };
                }
            };
            match self.storage.erase(&found.name) {
                Ok(true) => {
                    erased += 1;
                    debug!(%name, erased = %found.name, "deleted data");
                    let _ = self.event_tx.send(RepoEvent::Deleted {
                        name: found.name.without_implicit_digest(),
                    });
                }
                Ok(false) => {
                    warn!(%name, candidate = %found.name, "found entry vanished before erase");
                    return DeleteOutcome::Failed { erased };
                }
                Err(e) => {
                    warn!(%name, candidate = %found.name, error = %e, "erase failed during delete");
                    return DeleteOutcome::Failed { erased };
                }
            }
        }
        DeleteOutcome::Erased(erased)
    }

    pub fn read_data(&self, name: &Name) -> Result<Option<Data>, RepoError> {
        debug!(%name, "reading data");
        Ok(self.storage.read(name)?)
    }

    pub fn read_interest(&self, interest: &Interest) -> Result<Option<Data>, RepoError> {
        self.read_data(interest.name())
    }

    /// Whether an object is stored under exactly `full_name`.
    pub fn has(&self, full_name: &Name) -> Result<bool, RepoError> {
        Ok(self.storage.has(full_name)?)
    }

    pub fn size(&self) -> Result<i64, RepoError> {
        Ok(self.storage.size()?)
    }
}
