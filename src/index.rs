use crate::error::Result;
use crate::store::ContentStore;
use crate::types::{DocumentRecord, InteractionEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

const INDEX_KEY: &str = "index.json";
const CORRUPT_SUFFIX: &str = "corrupt";

/// Contents of `index.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFile {
    #[serde(default)]
    pub documents: BTreeMap<String, DocumentRecord>,
    #[serde(default)]
    pub interactions: Vec<InteractionEntry>,
    pub last_updated: DateTime<Utc>,
}

impl IndexFile {
    pub fn empty() -> Self {
        Self {
            documents: BTreeMap::new(),
            interactions: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

enum IndexState {
    Loaded(IndexFile),
    Missing,
    Corrupt(String),
}

/// Durable directory of every document and record in the knowledge base.
///
/// Mutations run as a full load-modify-save cycle under one mutex, so writers
/// in the same process never overwrite each other's changes. Saves go through
/// an atomic rename. Readers skip the lock.
pub struct KnowledgeIndex {
    store: ContentStore,
    lock: Mutex<()>,
}

impl KnowledgeIndex {
    /// Open the index stored in `store` and make sure it is readable
    pub fn init(store: ContentStore) -> Result<Self> {
        let index = Self {
            store,
            lock: Mutex::new(()),
        };

        {
            let _guard = index.guard();
            match index.read()? {
                IndexState::Loaded(_) => {}
                IndexState::Missing => index.save(&IndexFile::empty())?,
                IndexState::Corrupt(reason) => {
                    index.reset(&reason)?;
                }
            }
        }

        Ok(index)
    }

    /// Current index. A corrupt file is replaced by an empty index.
    pub fn load(&self) -> Result<IndexFile> {
        match self.read()? {
            IndexState::Loaded(index) => Ok(index),
            IndexState::Missing => Ok(IndexFile::empty()),
            IndexState::Corrupt(_) => {
                let _guard = self.guard();
                self.load_locked()
            }
        }
    }

    /// Atomically replace the index file
    pub fn save(&self, index: &IndexFile) -> Result<()> {
        let body = serde_json::to_vec_pretty(index)?;
        self.store.put(INDEX_KEY, &body)
    }

    /// Apply `mutate` to the latest index and save it, serialized with every other update
    pub fn update<T, F>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut IndexFile) -> Result<T>,
    {
        let _guard = self.guard();

        let mut index = self.load_locked()?;
        let out = mutate(&mut index)?;
        index.last_updated = Utc::now();
        self.save(&index)?;

        debug!(
            documents = index.documents.len(),
            interactions = index.interactions.len(),
            "Index saved"
        );
        Ok(out)
    }

    // Caller holds the lock
    fn load_locked(&self) -> Result<IndexFile> {
        match self.read()? {
            IndexState::Loaded(index) => Ok(index),
            IndexState::Missing => Ok(IndexFile::empty()),
            IndexState::Corrupt(reason) => self.reset(&reason),
        }
    }

    fn read(&self) -> Result<IndexState> {
        let Some(bytes) = self.store.get(INDEX_KEY)? else {
            return Ok(IndexState::Missing);
        };

        Ok(match serde_json::from_slice::<IndexFile>(&bytes) {
            Ok(index) => IndexState::Loaded(index),
            Err(e) => IndexState::Corrupt(e.to_string()),
        })
    }

    // Corrupt -> Empty. The unreadable file is kept next to the index for inspection.
    fn reset(&self, reason: &str) -> Result<IndexFile> {
        let path = self.store.path(INDEX_KEY)?;
        let backup = path.with_extension(format!("json.{}", CORRUPT_SUFFIX));

        warn!(
            path = %path.display(),
            backup = %backup.display(),
            reason,
            "Knowledge index is corrupt, resetting to empty"
        );

        if let Err(e) = fs::rename(&path, &backup) {
            warn!(error = %e, "Failed to preserve corrupt index");
        }

        let empty = IndexFile::empty();
        self.save(&empty)?;
        Ok(empty)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // Guards (), nothing to recover from a poisoned lock
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
