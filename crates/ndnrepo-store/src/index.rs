// ABOUTME: In-memory ordered index of stored full names, mapping each to its backend row id.
// ABOUTME: Answers exact membership and first-extension-of-prefix lookups without touching the database.

use std::collections::BTreeMap;

use ndnrepo_core::{Data, Interest, Name};
use thiserror::Error;

use crate::storage::key_locator_fingerprint;

/// Errors raised by index mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("index is full: capacity {capacity} entries")]
    Full { capacity: usize },

    #[error("index ids must be positive, got {0}")]
    InvalidId(i64),
}

/// One indexed object: its full name, optional signer fingerprint, and backend id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: Name,
    pub key_locator_hash: Option<[u8; 32]>,
    pub id: i64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    key_locator_hash: Option<[u8; 32]>,
    id: i64,
}

/// Ordered set of full names, at most one entry per exact name.
#[derive(Debug, Clone)]
pub struct Index {
    entries: BTreeMap<Name, Slot>,
    max_packets: usize,
}

impl Index {
    pub fn new(max_packets: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_packets,
        }
    }

    /// Index `data` under its full name. Returns false if that full name is already indexed.
    pub fn insert(&mut self, data: &Data, id: i64) -> Result<bool, IndexError> {
        let hash = key_locator_fingerprint(data).ok();
        self.insert_entry(data.full_name(), id, hash)
    }

    /// Index a full name whose fingerprint has already been computed.
    pub fn insert_entry(
        &mut self,
        full_name: Name,
        id: i64,
        key_locator_hash: Option<[u8; 32]>,
    ) -> Result<bool, IndexError> {
        if id <= 0 {
            return Err(IndexError::InvalidId(id));
        }
        if self.entries.contains_key(&full_name) {
            return Ok(false);
        }
        if self.is_full() {
            return Err(IndexError::Full {
                capacity: self.max_packets,
            });
        }
        self.entries.insert(full_name, Slot { key_locator_hash, id });
        Ok(true)
    }

    /// The smallest indexed name that `name` is a prefix of.
    ///
    /// When several full names share an application name, the lexicographically
    /// smallest one wins; callers wanting a specific variant query by full name.
    pub fn find(&self, name: &Name) -> Option<(i64, Name)> {
        let (found, slot) = self.entries.range(name.clone()..).next()?;
        name.is_prefix_of(found).then(|| (slot.id, found.clone()))
    }

    /// Like [`Index::find`], additionally honoring the Interest's publisher fingerprint when set.
    pub fn find_interest(&self, interest: &Interest) -> Option<(i64, Name)> {
        let Some(wanted) = interest.publisher_fingerprint() else {
            return self.find(interest.name());
        };
        self.entries
            .range(interest.name().clone()..)
            .take_while(|(found, _)| interest.name().is_prefix_of(found))
            .find(|(_, slot)| slot.key_locator_hash.as_ref() == Some(wanted))
            .map(|(found, slot)| (slot.id, found.clone()))
    }

    /// Exact full-name membership of `data`.
    pub fn has_data(&self, data: &Data) -> bool {
        self.entries.contains_key(&data.full_name())
    }

    pub fn has_name(&self, full_name: &Name) -> bool {
        self.entries.contains_key(full_name)
    }

    /// Backend id stored for an exact full name.
    pub fn get(&self, full_name: &Name) -> Option<i64> {
        self.entries.get(full_name).map(|slot| slot.id)
    }

    pub fn entry(&self, full_name: &Name) -> Option<IndexEntry> {
        self.entries.get(full_name).map(|slot| IndexEntry {
            name: full_name.clone(),
            key_locator_hash: slot.key_locator_hash,
            id: slot.id,
        })
    }

    pub fn erase(&mut self, full_name: &Name) -> bool {
        self.entries.remove(full_name).is_some()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.max_packets
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::key_locator_hash;
    use ndnrepo_core::KeyLocator;

    fn data(uri: &str, content: &[u8]) -> Data {
        Data::builder(Name::from_uri(uri).unwrap())
            .content(content.to_vec())
            .sign_digest_sha256()
    }

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[test]
    fn find_on_empty_index_is_none() {
        let index = Index::new(10);
        assert_eq!(index.find(&name("/")), None);
        assert_eq!(index.find(&name("/a/b")), None);
    }

    #[test]
    fn find_returns_extension_of_prefix() {
        let mut index = Index::new(10);
        let d = data("/a/b/c", b"x");
        assert!(index.insert(&d, 7).unwrap());

        for prefix in ["/", "/a", "/a/b", "/a/b/c"] {
            assert_eq!(index.find(&name(prefix)), Some((7, d.full_name())), "prefix {}", prefix);
        }
        assert_eq!(index.find(&name("/a/c")), None);
        assert_eq!(index.find(&name("/a/b/c/d")), None);
        assert_eq!(index.find(&d.full_name()), Some((7, d.full_name())));
    }

    #[test]
    fn find_skips_lexically_close_non_extensions() {
        let mut index = Index::new(10);
        let d = data("/ab", b"x");
        index.insert(&d, 1).unwrap();
        assert_eq!(index.find(&name("/a")), None);
    }

    #[test]
    fn find_by_application_name_picks_smallest_full_name() {
        let mut index = Index::new(10);
        let variants: Vec<Data> = (0u8..3).map(|i| data("/same", &[i])).collect();
        for (i, d) in variants.iter().enumerate() {
            index.insert(d, i as i64 + 1).unwrap();
        }
        let smallest = variants.iter().map(|d| d.full_name()).min().unwrap();
        let (_, found) = index.find(&name("/same")).unwrap();
        assert_eq!(found, smallest);
    }

    #[test]
    fn duplicate_full_name_is_rejected() {
        let mut index = Index::new(10);
        let d = data("/dup", b"x");
        assert!(index.insert(&d, 1).unwrap());
        assert!(!index.insert(&d, 2).unwrap());
        assert_eq!(index.get(&d.full_name()), Some(1));
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn has_data_tracks_insert_and_erase() {
        let mut index = Index::new(10);
        let d = data("/a", b"1");
        index.insert(&d, 1).unwrap();
        assert!(index.has_data(&d));
        assert!(!index.has_name(&name("/a")));
        assert!(index.erase(&d.full_name()));
        assert!(!index.has_data(&d));
        assert!(!index.erase(&d.full_name()));
    }

    #[test]
    fn capacity_and_id_are_enforced() {
        let mut index = Index::new(1);
        index.insert(&data("/one", b""), 1).unwrap();
        assert!(index.is_full());
        assert_eq!(
            index.insert(&data("/two", b""), 2),
            Err(IndexError::Full { capacity: 1 })
        );
        let mut index = Index::new(5);
        assert_eq!(
            index.insert(&data("/zero", b""), 0),
            Err(IndexError::InvalidId(0))
        );
    }

    #[test]
    fn fingerprint_is_recorded_only_with_key_locator() {
        let mut index = Index::new(10);
        let unsigned = data("/plain", b"");
        let located = Data::builder(name("/located"))
            .key_locator(KeyLocator::Name(name("/key")))
            .sign_digest_sha256();
        index.insert(&unsigned, 1).unwrap();
        index.insert(&located, 2).unwrap();

        assert_eq!(index.entry(&unsigned.full_name()).unwrap().key_locator_hash, None);
        assert!(index.entry(&located.full_name()).unwrap().key_locator_hash.is_some());
    }

    #[test]
    fn publisher_fingerprint_narrows_interest_lookup() {
        let mut index = Index::new(10);
        let alice = Data::builder(name("/doc/1"))
            .key_locator(KeyLocator::Name(name("/alice/key")))
            .sign_digest_sha256();
        let bob = Data::builder(name("/doc/2"))
            .key_locator(KeyLocator::Name(name("/bob/key")))
            .sign_digest_sha256();
        index.insert(&alice, 1).unwrap();
        index.insert(&bob, 2).unwrap();

        let bob_hash = key_locator_fingerprint(&bob).unwrap();
        let interest = Interest::new(name("/doc")).with_publisher_fingerprint(bob_hash);
        assert_eq!(index.find_interest(&interest), Some((2, bob.full_name())));
        assert_eq!(
            index.find_interest(&Interest::new(name("/doc"))),
            Some((1, alice.full_name()))
        );
    }

    #[test]
    fn unmatched_publisher_fingerprint_finds_nothing() {
        let mut index = Index::new(10);
        let signed = Data::builder(name("/doc/1"))
            .key_locator(KeyLocator::Name(name("/alice/key")))
            .sign_digest_sha256();
        index.insert(&signed, 1).unwrap();
        index.insert(&data("/doc/2", b""), 2).unwrap();

        let stranger = key_locator_hash(&KeyLocator::Name(name("/mallory/key")));
        let interest = Interest::new(name("/doc")).with_publisher_fingerprint(stranger);
        assert_eq!(index.find_interest(&interest), None);
        assert!(index.find(&name("/doc")).is_some());
    }
}
