use crate::cache::DEFAULT_TTL;
use crate::synthesis::DEFAULT_TIMEOUT;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project data directory
pub const DATA_DIR: &str = ".speech-agent";

pub const ENV_DATA_PATH: &str = "SPEECH_AGENT_PATH";
pub const ENV_ENDPOINT: &str = "RUNPOD_API_ENDPOINT";
pub const ENV_API_KEY: &str = "RUNPOD_API_KEY";
pub const ENV_CACHE_TTL: &str = "CACHE_EXPIRATION_SECONDS";

pub const KEY_ENDPOINT: &str = "synthesis_endpoint";
pub const KEY_API_KEY: &str = "api_key";
pub const KEY_TIMEOUT: &str = "synthesis_timeout_seconds";
pub const KEY_CACHE_TTL: &str = "cache_ttl_seconds";

/// Keys understood by `config`, with a short description
pub static KNOWN_KEYS: &[(&str, &str)] = &[
    (KEY_ENDPOINT, "URL of the synthesis endpoint"),
    (KEY_API_KEY, "Bearer token for the synthesis endpoint (global only)"),
    (KEY_TIMEOUT, "Synthesis request timeout in seconds (default 120)"),
    (KEY_CACHE_TTL, "Audio cache lifetime in seconds (default 86400)"),
];

// -----------------------------------------------------------------------------
// Global config (credentials and endpoint shared by every project)
// -----------------------------------------------------------------------------

fn global_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("speech-agent")
}

fn global_config_file() -> PathBuf {
    global_config_dir().join("config.yaml")
}

/// Get global config
pub fn get_global_config() -> HashMap<String, String> {
    let path = global_config_file();
    if path.exists() {
        if let Ok(content) = fs::read_to_string(&path) {
            if let Ok(config) = serde_yaml::from_str::<HashMap<String, String>>(&content) {
                return config;
            }
        }
    }
    HashMap::new()
}

/// Set a global config value
pub fn set_global_config(key: &str, value: &str) -> std::io::Result<()> {
    let dir = global_config_dir();
    fs::create_dir_all(&dir)?;

    let mut config = get_global_config();
    config.insert(key.to_string(), value.to_string());

    let content = serde_yaml::to_string(&config).unwrap_or_default();
    fs::write(global_config_file(), content)
}

// -----------------------------------------------------------------------------
// Per-project config
// -----------------------------------------------------------------------------

/// Configuration and layout of a `.speech-agent` directory
pub struct AgentConfig {
    data_path: PathBuf,
    config_file: PathBuf,
    config: HashMap<String, serde_yaml::Value>,
    global: HashMap<String, String>,
}

impl AgentConfig {
    pub fn new(data_path: PathBuf) -> Self {
        let config_file = data_path.join("_config.yaml");
        let mut instance = Self {
            data_path,
            config_file,
            config: HashMap::new(),
            global: get_global_config(),
        };
        instance.load();
        instance
    }

    fn load(&mut self) {
        if self.config_file.exists() {
            if let Ok(content) = fs::read_to_string(&self.config_file) {
                if let Ok(config) =
                    serde_yaml::from_str::<HashMap<String, serde_yaml::Value>>(&content)
                {
                    self.config = config;
                }
            }
        }
    }

    fn save(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_path)?;
        let content = serde_yaml::to_string(&self.config).unwrap_or_default();
        fs::write(&self.config_file, content)
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_path.join("cache")
    }

    pub fn knowledge_dir(&self) -> PathBuf {
        self.data_path.join("knowledge")
    }

    /// Project value for `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).and_then(|v| match v {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        self.config
            .insert(key.to_string(), serde_yaml::Value::String(value.to_string()));
        self.save()
    }

    /// Environment, then project, then global config
    fn resolve(&self, env: Option<&str>, key: &str) -> Option<String> {
        env.and_then(|name| std::env::var(name).ok())
            .filter(|v| !v.is_empty())
            .or_else(|| self.get(key))
            .or_else(|| self.global.get(key).cloned())
    }

    pub fn synthesis_endpoint(&self) -> Option<String> {
        self.resolve(Some(ENV_ENDPOINT), KEY_ENDPOINT)
    }

    /// Only read from the environment and the global file, never the project
    pub fn api_key(&self) -> Option<String> {
        std::env::var(ENV_API_KEY)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.global.get(KEY_API_KEY).cloned())
    }

    pub fn synthesis_timeout(&self) -> Duration {
        self.resolve(None, KEY_TIMEOUT)
            .and_then(|v| parse_seconds(&v))
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn cache_ttl(&self) -> Duration {
        self.resolve(Some(ENV_CACHE_TTL), KEY_CACHE_TTL)
            .and_then(|v| parse_seconds(&v))
            .unwrap_or(DEFAULT_TTL)
    }
}

/// Whole or fractional seconds, non-negative
pub fn parse_seconds(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Find the data directory, searching upward from current directory
pub fn find_data_path() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let data = current.join(DATA_DIR);
        if data.is_dir() {
            return Some(data);
        }

        if !current.pop() {
            break;
        }
    }

    // Check SPEECH_AGENT_PATH environment variable
    if let Ok(path) = std::env::var(ENV_DATA_PATH) {
        let data = PathBuf::from(path);
        if data.is_dir() {
            return Some(data);
        }
    }

    None
}
