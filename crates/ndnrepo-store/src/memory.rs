// ABOUTME: Non-durable Storage backed by the Index and a map from id to encoded Data.
// ABOUTME: Used by tests and by the `memory` storage mode.

use std::collections::HashMap;

use ndnrepo_core::{Data, Name};

use crate::index::{Index, IndexError};
use crate::storage::{Found, MatchMode, Storage, StorageError};

pub struct MemoryStorage {
    index: Index,
    rows: HashMap<i64, Vec<u8>>,
    next_id: i64,
}

impl MemoryStorage {
    pub fn new(max_packets: usize) -> Self {
        Self {
            index: Index::new(max_packets),
            rows: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    fn load(&self, id: i64) -> Result<Option<Data>, StorageError> {
        self.rows
            .get(&id)
            .map(|wire| Data::wire_decode(wire))
            .transpose()
            .map_err(StorageError::from)
    }
}

impl Storage for MemoryStorage {
    fn insert(&mut self, data: &Data) -> Result<i64, StorageError> {
        if data.name().is_empty() {
            return Err(StorageError::EmptyName);
        }
        if self.index.has_data(data) {
            return Err(StorageError::DuplicateName(data.full_name()));
        }
        if self.index.is_full() {
            return Err(IndexError::Full {
                capacity: self.index.capacity(),
            }
            .into());
        }
        let id = self.next_id;
        self.index.insert(data, id)?;
        self.rows.insert(id, data.wire_encode().to_vec());
        self.next_id += 1;
        Ok(id)
    }

    fn erase(&mut self, full_name: &Name) -> Result<bool, StorageError> {
        let Some(id) = self.index.get(full_name) else {
            return Ok(false);
        };
        self.index.erase(full_name);
        Ok(self.rows.remove(&id).is_some())
    }

    fn has(&self, full_name: &Name) -> Result<bool, StorageError> {
        Ok(self.index.has_name(full_name))
    }

    fn read(&self, name: &Name) -> Result<Option<Data>, StorageError> {
        match self.index.find(name) {
            Some((id, _)) => self.load(id),
            None => Ok(None),
        }
    }

    fn find(&self, name: &Name, mode: MatchMode) -> Result<Option<Found>, StorageError> {
        let found = match mode {
            MatchMode::Exact => self.index.get(name).map(|id| Found {
                id,
                name: name.clone(),
            }),
            MatchMode::Prefix => self.index.find(name).map(|(id, name)| Found { id, name }),
        };
        Ok(found)
    }

    fn size(&self) -> Result<i64, StorageError> {
        Ok(self.rows.len() as i64)
    }
}
