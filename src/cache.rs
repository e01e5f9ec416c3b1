use crate::error::Result;
use crate::store::{digest_hex, ContentStore};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Temporaries older than this are left over from an interrupted write
const STALE_TEMP_AGE: Duration = Duration::from_secs(10 * 60);

const PAYLOAD_EXT: &str = "wav";
const META_EXT: &str = "meta";

/// Disk cache of synthesized audio keyed by the MD5 of the input text.
///
/// Each entry is a `<key>.wav` payload plus a `<key>.meta` file holding the
/// Unix timestamp it was written at. The payload is always published before
/// its metadata, and an entry only counts as present once the metadata
/// exists. Expired or corrupt entries are removed the next time they are read.
pub struct AudioCache {
    store: ContentStore,
    ttl: Duration,
}

impl AudioCache {
    pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        Ok(Self {
            store: ContentStore::open(dir)?,
            ttl,
        })
    }

    /// Cache key for `text`. The text is hashed exactly as given.
    pub fn key(text: &str) -> String {
        digest_hex(text.as_bytes())
    }

    /// Return the cached audio for `text`, or `None` on a miss
    pub fn lookup(&self, text: &str) -> Result<Option<Vec<u8>>> {
        let key = Self::key(text);
        let (payload_key, meta_key) = entry_keys(&key);

        let Some(meta) = self.store.get(&meta_key)? else {
            return Ok(None);
        };

        let Some(created_at) = parse_timestamp(&meta) else {
            warn!(key = %key, "Unreadable cache metadata, dropping entry");
            self.remove_entry(&key)?;
            return Ok(None);
        };

        let age = unix_now() - created_at;
        if age > self.ttl.as_secs_f64() {
            info!(key = %key, text = %preview(text), age_secs = age, "Cache expired");
            self.remove_entry(&key)?;
            return Ok(None);
        }

        match self.store.get(&payload_key)? {
            Some(audio) => {
                info!(key = %key, text = %preview(text), "Cache hit");
                Ok(Some(audio))
            }
            None => Ok(None),
        }
    }

    /// Cache `audio` for `text`, replacing any previous entry
    pub fn store(&self, text: &str, audio: &[u8]) -> Result<()> {
        let key = Self::key(text);
        let (payload_key, meta_key) = entry_keys(&key);

        self.store.put(&payload_key, audio)?;
        self.store
            .put(&meta_key, format!("{:.6}", unix_now()).as_bytes())?;

        info!(key = %key, text = %preview(text), bytes = audio.len(), "Cached audio");
        Ok(())
    }

    /// Delete every cached artifact. Returns the number of distinct keys removed.
    pub fn clear(&self) -> Result<usize> {
        let count = clear_artifacts(self.store.keys()?, |artifact| self.store.delete(artifact));

        match self.store.remove_temporaries(STALE_TEMP_AGE) {
            Ok(0) => {}
            Ok(n) => debug!(count = n, "Removed stale temporaries"),
            Err(e) => warn!(error = %e, "Failed to remove stale temporaries"),
        }

        info!(count, "Cleared cache");
        Ok(count)
    }

    // Metadata first: without it the entry is already a miss
    fn remove_entry(&self, key: &str) -> Result<()> {
        let (payload_key, meta_key) = entry_keys(key);
        self.store.delete(&meta_key)?;
        self.store.delete(&payload_key)?;
        debug!(key, "Removed cache entry");
        Ok(())
    }
}

/// Delete each artifact, counting distinct key stems that were actually removed.
/// Failures are logged and skipped.
fn clear_artifacts(
    artifacts: Vec<String>,
    mut delete: impl FnMut(&str) -> Result<bool>,
) -> usize {
    let mut cleared = HashSet::new();

    for artifact in artifacts {
        match delete(&artifact) {
            Ok(true) => {
                let stem = artifact
                    .rsplit_once('.')
                    .map(|(stem, _)| stem)
                    .unwrap_or(artifact.as_str());
                cleared.insert(stem.to_string());
            }
            Ok(false) => debug!(artifact = %artifact, "Cache file already gone"),
            Err(e) => warn!(artifact = %artifact, error = %e, "Failed to delete cache file"),
        }
    }

    cleared.len()
}

fn entry_keys(key: &str) -> (String, String) {
    (
        format!("{}.{}", key, PAYLOAD_EXT),
        format!("{}.{}", key, META_EXT),
    )
}

fn parse_timestamp(meta: &[u8]) -> Option<f64> {
    std::str::from_utf8(meta)
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|ts| ts.is_finite())
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// First 50 characters of `text` for log lines
pub(crate) fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(50).collect();
    if text.chars().count() > 50 {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    fn make_cache(ttl: Duration) -> (TempDir, AudioCache) {
        let temp = TempDir::new().unwrap();
        let cache = AudioCache::open(temp.path().join("cache"), ttl).unwrap();
        (temp, cache)
    }

    fn artifact(temp: &TempDir, text: &str, ext: &str) -> PathBuf {
        temp.path()
            .join("cache")
            .join(format!("{}.{}", AudioCache::key(text), ext))
    }

    #[test]
    fn test_store_then_lookup() {
        let (_temp, cache) = make_cache(DEFAULT_TTL);

        assert!(cache.lookup("hello").unwrap().is_none());
        cache.store("hello", b"RIFF....WAVE").unwrap();
        assert_eq!(cache.lookup("hello").unwrap().unwrap(), b"RIFF....WAVE");
    }

    #[test]
    fn test_key_is_exact_text() {
        let (_temp, cache) = make_cache(DEFAULT_TTL);

        cache.store("Hello", b"a").unwrap();
        assert!(cache.lookup("hello").unwrap().is_none());
        assert!(cache.lookup("Hello ").unwrap().is_none());
        assert!(cache.lookup("Hello").unwrap().is_some());
    }

    #[test]
    fn test_expired_entry_is_removed() {
        let (temp, cache) = make_cache(Duration::from_secs(1));

        cache.store("abc", b"audio").unwrap();
        std::thread::sleep(Duration::from_secs(2));

        assert!(cache.lookup("abc").unwrap().is_none());
        assert!(!artifact(&temp, "abc", "wav").exists());
        assert!(!artifact(&temp, "abc", "meta").exists());
    }

    #[test]
    fn test_old_timestamp_counts_as_expired() {
        let (temp, cache) = make_cache(Duration::from_secs(60));

        cache.store("abc", b"audio").unwrap();
        let stale = unix_now() - 120.0;
        fs::write(artifact(&temp, "abc", "meta"), format!("{}", stale)).unwrap();

        assert!(cache.lookup("abc").unwrap().is_none());
        assert!(!artifact(&temp, "abc", "wav").exists());
    }

    #[test]
    fn test_corrupt_metadata_self_heals() {
        let (temp, cache) = make_cache(DEFAULT_TTL);

        cache.store("abc", b"audio").unwrap();
        fs::write(artifact(&temp, "abc", "meta"), b"not a timestamp").unwrap();

        assert!(cache.lookup("abc").unwrap().is_none());
        assert!(!artifact(&temp, "abc", "wav").exists());
        assert!(!artifact(&temp, "abc", "meta").exists());

        // Entry can be filled again afterwards
        cache.store("abc", b"fresh").unwrap();
        assert_eq!(cache.lookup("abc").unwrap().unwrap(), b"fresh");
    }

    #[test]
    fn test_payload_without_metadata_is_a_miss() {
        let (temp, cache) = make_cache(DEFAULT_TTL);

        fs::write(artifact(&temp, "abc", "wav"), b"half written entry").unwrap();

        assert!(cache.lookup("abc").unwrap().is_none());
        // Left alone: a concurrent store may be about to publish the metadata
        assert!(artifact(&temp, "abc", "wav").exists());
    }

    #[test]
    fn test_clear_counts_keys() {
        let (_temp, cache) = make_cache(DEFAULT_TTL);

        cache.store("one", b"1").unwrap();
        cache.store("two", b"2").unwrap();
        cache.store("three", b"3").unwrap();

        assert_eq!(cache.clear().unwrap(), 3);
        for text in ["one", "two", "three"] {
            assert!(cache.lookup(text).unwrap().is_none());
        }
        assert_eq!(cache.clear().unwrap(), 0);
    }

    #[test]
    fn test_clear_skips_failed_and_vanished_deletes() {
        let artifacts = vec![
            "aaa.meta".to_string(),
            "aaa.wav".to_string(),
            "bbb.meta".to_string(),
            "bbb.wav".to_string(),
            "ccc.wav".to_string(),
            "ddd.wav".to_string(),
        ];
        let mut attempted = Vec::new();

        let count = clear_artifacts(artifacts, |artifact| {
            attempted.push(artifact.to_string());
            match artifact {
                "ccc.wav" => Err(Error::storage(artifact, io::Error::other("denied"))),
                "ddd.wav" => Ok(false),
                _ => Ok(true),
            }
        });

        assert_eq!(count, 2);
        assert_eq!(attempted.len(), 6);
    }

    #[test]
    fn test_clear_removes_stale_temporaries() {
        let (temp, cache) = make_cache(DEFAULT_TTL);
        let leftover = temp.path().join("cache").join(".tmp-crashed");

        cache.store("one", b"1").unwrap();
        fs::write(&leftover, b"partial").unwrap();
        let old = SystemTime::now() - STALE_TEMP_AGE - Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&leftover)
            .unwrap()
            .set_modified(old)
            .unwrap();

        assert_eq!(cache.clear().unwrap(), 1);
        assert!(!leftover.exists());
    }

    #[test]
    fn test_concurrent_stores_never_tear() {
        let (_temp, cache) = make_cache(DEFAULT_TTL);
        let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 64 * 1024]).collect();

        std::thread::scope(|s| {
            for payload in &payloads {
                let cache = &cache;
                s.spawn(move || cache.store("shared", payload).unwrap());
            }
            s.spawn(|| {
                for _ in 0..50 {
                    if let Some(audio) = cache.lookup("shared").unwrap() {
                        assert!(payloads.contains(&audio));
                    }
                }
            });
        });

        let audio = cache.lookup("shared").unwrap().unwrap();
        assert!(payloads.contains(&audio));
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(60);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(50)));
    }
}
