use super::{open_config, open_knowledge};
use crate::cache::AudioCache;
use crate::config::ENV_ENDPOINT;
use crate::error::Error;
use crate::speech::SpeechService;
use crate::synthesis::HttpSynthesizer;
use std::fs;

const MAX_TEXT_CHARS: usize = 1000;

/// Run the speak command
pub fn run_speak(text: &str, output: &str, record: bool) -> Result<(), String> {
    validate_text(text).map_err(|e| e.to_string())?;

    let config = open_config()?;
    let endpoint = config.synthesis_endpoint().ok_or_else(|| {
        format!(
            concat!(
                "No synthesis endpoint configured. Set {} or run:\n",
                "  speech-agent config synthesis_endpoint <url>",
            ),
            ENV_ENDPOINT
        )
    })?;

    let cache = AudioCache::open(config.cache_dir(), config.cache_ttl())
        .map_err(|e| format!("Failed to open cache: {}", e))?;
    let synthesizer = HttpSynthesizer::new(&endpoint, config.api_key(), config.synthesis_timeout())
        .map_err(|e| e.to_string())?;

    let knowledge = if record {
        Some(open_knowledge(&config)?)
    } else {
        None
    };

    let mut service = SpeechService::new(&cache, &synthesizer);
    if let Some(kb) = &knowledge {
        service = service.with_knowledge(kb);
    }

    let spoken = service.speak(text).map_err(|e| e.to_string())?;

    fs::write(output, &spoken.audio).map_err(|e| format!("Failed to write {}: {}", output, e))?;

    println!(
        "Wrote {} ({:.1} KB{})",
        output,
        spoken.audio.len() as f64 / 1024.0,
        if spoken.cached { ", cached" } else { "" }
    );

    Ok(())
}

fn validate_text(text: &str) -> Result<(), Error> {
    if text.trim().is_empty() {
        return Err(Error::Validation("No text provided".to_string()));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(Error::Validation(format!(
            "Text too long. Maximum {} characters allowed.",
            MAX_TEXT_CHARS
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_text() {
        assert!(validate_text("hello").is_ok());
        assert!(validate_text(&"a".repeat(MAX_TEXT_CHARS)).is_ok());
        assert!(matches!(validate_text(""), Err(Error::Validation(_))));
        assert!(matches!(validate_text("   "), Err(Error::Validation(_))));
        assert!(matches!(
            validate_text(&"a".repeat(MAX_TEXT_CHARS + 1)),
            Err(Error::Validation(_))
        ));
    }
}
