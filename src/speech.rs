use crate::cache::{preview, AudioCache};
use crate::error::Result;
use crate::knowledge::KnowledgeStore;
use crate::synthesis::Synthesizer;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

const RECORDED_RESPONSE: &str = "[Audio response generated]";

/// Audio for a request and whether it came from the cache
#[derive(Debug)]
pub struct Spoken {
    pub audio: Vec<u8>,
    pub cached: bool,
}

/// Cache-first speech synthesis that logs each request to the knowledge base
pub struct SpeechService<'a> {
    cache: &'a AudioCache,
    synthesizer: &'a dyn Synthesizer,
    knowledge: Option<&'a KnowledgeStore>,
}

impl<'a> SpeechService<'a> {
    pub fn new(cache: &'a AudioCache, synthesizer: &'a dyn Synthesizer) -> Self {
        Self {
            cache,
            synthesizer,
            knowledge: None,
        }
    }

    /// Record every request as an interaction in `knowledge`
    pub fn with_knowledge(mut self, knowledge: &'a KnowledgeStore) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn speak(&self, text: &str) -> Result<Spoken> {
        let spoken = match self.cache.lookup(text)? {
            Some(audio) => Spoken { audio, cached: true },
            None => {
                let audio = self.synthesizer.synthesize(text)?;
                self.cache.store(text, &audio)?;
                info!(text = %preview(text), bytes = audio.len(), "Synthesized audio");
                Spoken {
                    audio,
                    cached: false,
                }
            }
        };

        if let Some(knowledge) = self.knowledge {
            let metadata = request_metadata(text, &spoken);
            if let Err(e) = knowledge.record_interaction(text, RECORDED_RESPONSE, metadata) {
                warn!(error = %e, "Failed to record interaction");
            }
        }

        Ok(spoken)
    }
}

fn request_metadata(text: &str, spoken: &Spoken) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("request_type".to_string(), json!("tts_request"));
    metadata.insert("text_length".to_string(), json!(text.chars().count()));
    metadata.insert("audio_size".to_string(), json!(spoken.audio.len()));
    metadata.insert("cached".to_string(), json!(spoken.cached));
    metadata
}
