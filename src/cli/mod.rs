pub mod cache;
pub mod config;
pub mod knowledge;
pub mod speak;

use crate::config::{find_data_path, AgentConfig};
use crate::knowledge::KnowledgeStore;

const NOT_INITIALIZED: &str = "No .speech-agent directory found. Run 'speech-agent init' first.";

/// Config of the nearest .speech-agent directory
pub fn open_config() -> Result<AgentConfig, String> {
    let data_path = find_data_path().ok_or(NOT_INITIALIZED)?;
    Ok(AgentConfig::new(data_path))
}

pub fn open_knowledge(config: &AgentConfig) -> Result<KnowledgeStore, String> {
    KnowledgeStore::open(config.knowledge_dir())
        .map_err(|e| format!("Failed to open knowledge base: {}", e))
}
