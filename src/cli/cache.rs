use super::open_config;
use crate::cache::AudioCache;

/// Run the cache clear command
pub fn run_clear() -> Result<(), String> {
    let config = open_config()?;
    let cache = AudioCache::open(config.cache_dir(), config.cache_ttl())
        .map_err(|e| format!("Failed to open cache: {}", e))?;

    let count = cache
        .clear()
        .map_err(|e| format!("Failed to clear cache: {}", e))?;

    println!("Cleared {} entries from cache", count);
    Ok(())
}
