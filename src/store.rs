use crate::error::{Error, Result};
use md5::{Digest, Md5};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// Prefix used for in-flight writes. Never a valid key.
const TEMP_PREFIX: &str = ".tmp";

/// Hex MD5 digest used for every content address in the tool
pub fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Flat directory of artifacts addressed by file name.
///
/// Writes go to a temporary file in the same directory and are renamed into
/// place, so a reader sees either the previous artifact, nothing, or the
/// complete new one.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::storage(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the artifact for `key`, whether or not it exists
    pub fn path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.path(key)?.is_file())
    }

    /// Atomically publish `bytes` under `key`
    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.root)
            .map_err(|e| Error::storage(&self.root, e))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::storage(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| Error::storage(&path, e.error))?;

        Ok(())
    }

    /// Read the artifact for `key`, `None` if it does not exist
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(path, e)),
        }
    }

    /// Remove the artifact for `key`. Returns whether anything was removed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::storage(path, e)),
        }
    }

    /// Published artifact keys, sorted. Temporaries are skipped, including ones
    /// left behind by an interrupted `put`; see [`ContentStore::remove_temporaries`].
    pub fn keys(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| Error::storage(&self.root, e))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage(&self.root, e))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_key(name).is_ok() {
                    keys.push(name.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Delete temporaries at least `min_age` old. Younger ones may still belong
    /// to a write in progress. Returns how many were removed.
    pub fn remove_temporaries(&self, min_age: Duration) -> Result<usize> {
        let entries = fs::read_dir(&self.root).map_err(|e| Error::storage(&self.root, e))?;
        let now = SystemTime::now();

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage(&self.root, e))?;
            let is_temp = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(TEMP_PREFIX));
            if !is_temp {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);
            if age < min_age {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(Error::storage(entry.path(), e)),
            }
        }

        Ok(removed)
    }

    /// Total size of every file under the root, recursively
    pub fn size_bytes(&self) -> u64 {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }
}

fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\'])
        || key.contains('\0');

    if invalid {
        Err(Error::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}
