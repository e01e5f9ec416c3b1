use super::open_config;
use crate::config::{
    get_global_config, parse_seconds, set_global_config, KEY_API_KEY, KEY_CACHE_TTL, KEY_TIMEOUT,
    KNOWN_KEYS,
};

/// Run the config command
pub fn run_config(key: Option<&str>, value: Option<&str>, global: bool) -> Result<(), String> {
    if let (Some(k), Some(v)) = (key, value) {
        validate(k, v, global)?;
    }

    if global {
        return run_global(key, value);
    }

    let mut config = open_config()?;

    match (key, value) {
        (None, None) => {
            // Show effective configuration
            println!("Current configuration:\n");

            println!(
                "  synthesis_endpoint:        {}",
                config.synthesis_endpoint().unwrap_or_else(|| "(not set)".to_string())
            );
            println!(
                "  api_key:                   {}",
                if config.api_key().is_some() { "(set)" } else { "(not set)" }
            );
            println!(
                "  synthesis_timeout_seconds: {}",
                config.synthesis_timeout().as_secs_f64()
            );
            println!("  cache_ttl_seconds:         {}", config.cache_ttl().as_secs_f64());
            println!("\n  data: {}", config.data_path().display());
        }
        (Some(k), None) => {
            // Show specific key
            if let Some(v) = config.get(k) {
                println!("{}: {}", k, v);
            } else {
                println!("{}: (not set)", k);
            }
        }
        (Some(k), Some(v)) => {
            config.set(k, v).map_err(|e| format!("Failed to save: {}", e))?;
            println!("Set {} = {}", k, v);
        }
        (None, Some(_)) => {
            return Err("Key required when setting a value".to_string());
        }
    }

    Ok(())
}

fn run_global(key: Option<&str>, value: Option<&str>) -> Result<(), String> {
    match (key, value) {
        (None, None) => {
            let config = get_global_config();
            if config.is_empty() {
                println!("Global configuration is empty.\n");
                print_keys();
                return Ok(());
            }

            let mut keys: Vec<_> = config.keys().collect();
            keys.sort();
            for k in keys {
                let shown = if k == KEY_API_KEY { "(set)" } else { config[k].as_str() };
                println!("  {}: {}", k, shown);
            }
        }
        (Some(k), None) => match get_global_config().get(k) {
            Some(_) if k == KEY_API_KEY => println!("{}: (set)", k),
            Some(v) => println!("{}: {}", k, v),
            None => println!("{}: (not set)", k),
        },
        (Some(k), Some(v)) => {
            set_global_config(k, v).map_err(|e| format!("Failed to save: {}", e))?;
            println!("Set global {}", k);
        }
        (None, Some(_)) => {
            return Err("Key required when setting a value".to_string());
        }
    }

    Ok(())
}

fn validate(key: &str, value: &str, global: bool) -> Result<(), String> {
    if !KNOWN_KEYS.iter().any(|(k, _)| *k == key) {
        print_keys();
        return Err(format!("Unknown config key: {}", key));
    }

    if key == KEY_API_KEY && !global {
        return Err("api_key is only stored globally. Use --global.".to_string());
    }

    if (key == KEY_TIMEOUT || key == KEY_CACHE_TTL) && parse_seconds(value).is_none() {
        return Err(format!("{} must be a non-negative number of seconds", key));
    }

    Ok(())
}

fn print_keys() {
    println!("Available keys:\n");
    for (key, description) in KNOWN_KEYS {
        println!("  {:28} {}", key, description);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(validate(KEY_CACHE_TTL, "3600", false).is_ok());
        assert!(validate(KEY_CACHE_TTL, "an hour", false).is_err());
        assert!(validate(KEY_API_KEY, "secret", false).is_err());
        assert!(validate(KEY_API_KEY, "secret", true).is_ok());
        assert!(validate("colour", "blue", false).is_err());
    }
}
