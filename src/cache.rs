//! Local snapshots used as an offline cache.
//!
//! `SnapshotCache` stores one whole-file JSON blob per kind under a directory. `ListCache` is
//! the per-kind list a screen shows: the public entities of a city and the current user's
//! private ones. A list cache is built by its owner and passed where it is needed; there is
//! no shared instance.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::entity::{Access, Shareable, Timestamp};
use crate::error::StoreError;
use crate::log::{debug, trace};

pub struct SnapshotCache {
    dir: PathBuf,
}

impl SnapshotCache {
    /// # Errors
    /// `StoreError::IoError` if the directory cannot be created.
    pub fn new(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    #[must_use]
    pub fn file_for(&self, kind: &str) -> PathBuf {
        self.dir.join(format!("{kind}.json"))
    }

    /// Writes the snapshot for `kind`, replacing any previous one. The file is written next to
    /// its destination and renamed into place, so readers never see half a snapshot.
    ///
    /// # Errors
    /// Serialization or I/O failures.
    pub fn save<T: Serialize + ?Sized>(&self, kind: &str, value: &T) -> Result<(), StoreError> {
        let destination = self.file_for(kind);
        let staging = self.dir.join(format!(".{kind}.json.tmp"));
        let mut file = fs::File::create(&staging)?;
        file.write_all(&serde_json::to_vec(value)?)?;
        file.sync_all()?;
        fs::rename(&staging, &destination)?;
        trace!("saved snapshot {}", destination.display());
        Ok(())
    }

    /// `Ok(None)` if no snapshot has been saved for `kind`.
    ///
    /// # Errors
    /// I/O failures other than a missing file, or a snapshot that does not decode.
    pub fn load<T: DeserializeOwned>(&self, kind: &str) -> Result<Option<T>, StoreError> {
        match fs::read(self.file_for(kind)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns whether there was a snapshot to remove.
    ///
    /// # Errors
    /// I/O failures other than a missing file.
    pub fn remove(&self, kind: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.file_for(kind)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// What `ListCache::upsert` did with an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheChange {
    Unchanged,
    /// Added, or replaced the cached copy.
    Placed,
    /// The cached copy was removed because the entity no longer belongs in this cache.
    Dropped,
}

/// Whether two copies hold the same stored fields. Revisions are not compared.
fn same_record<E: Serialize>(a: &E, b: &E) -> bool {
    matches!(
        (serde_json::to_value(a), serde_json::to_value(b)),
        (Ok(a), Ok(b)) if a == b
    )
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "E: Shareable")]
pub struct ListCache<E: Shareable> {
    owner_id: String,
    pub public: Vec<E>,
    pub private: Vec<E>,
    /// Timestamp of the newest change log entry applied so far.
    pub last_sync: Timestamp,
}

impl<E: Shareable> ListCache<E> {
    #[must_use]
    pub fn new(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            public: Vec::new(),
            private: Vec::new(),
            last_sync: 0,
        }
    }

    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&E> {
        self.public
            .iter()
            .chain(&self.private)
            .find(|entity| entity.id() == Some(id))
    }

    /// Places `entity` in the list it belongs to. An older copy than the one cached, or one
    /// identical to it, is ignored. A private entity of another owner is dropped along with
    /// any cached copy of it.
    pub fn upsert(&mut self, entity: E) -> CacheChange {
        let Some(id) = entity.id().map(str::to_string) else {
            return CacheChange::Unchanged;
        };
        if let Some(cached) = self.get(&id) {
            if cached.timestamp() > entity.timestamp() {
                trace!("kept newer cached copy of {}", id);
                return CacheChange::Unchanged;
            }
            if same_record(cached, &entity) {
                return CacheChange::Unchanged;
            }
        }
        let removed = self.remove(&id);
        let placement = entity.placement();
        match placement.access {
            Access::Public => self.public.push(entity),
            Access::Private if placement.owner_id == self.owner_id => self.private.push(entity),
            Access::Private if removed => return CacheChange::Dropped,
            Access::Private => return CacheChange::Unchanged,
        }
        CacheChange::Placed
    }

    /// Returns whether the id was cached.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.public.len() + self.private.len();
        self.public.retain(|entity| entity.id() != Some(id));
        self.private.retain(|entity| entity.id() != Some(id));
        before != self.public.len() + self.private.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.public.len() + self.private.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// # Errors
    /// Serialization or I/O failures.
    pub fn persist(&self, snapshots: &SnapshotCache) -> Result<(), StoreError> {
        snapshots.save(E::COLLECTION, self)
    }

    /// Loads the saved list for `owner_id`, or an empty one if there is none or it belongs to
    /// somebody else.
    ///
    /// # Errors
    /// I/O failures, or a snapshot that does not decode.
    pub fn restore(snapshots: &SnapshotCache, owner_id: &str) -> Result<Self, StoreError> {
        match snapshots.load::<Self>(E::COLLECTION)? {
            Some(mut cache) if cache.owner_id == owner_id => {
                // Snapshots hold what the backend held when they were taken.
                for entity in cache.public.iter_mut().chain(cache.private.iter_mut()) {
                    entity.remember_saved();
                }
                debug!("restored {} cached {}", cache.len(), E::COLLECTION);
                Ok(cache)
            }
            Some(_) => {
                debug!("discarding {} snapshot of another user", E::COLLECTION);
                Ok(Self::new(owner_id))
            }
            None => Ok(Self::new(owner_id)),
        }
    }
}
