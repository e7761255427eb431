//! Cache layout and engine configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default base URL for a local Ollama server.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Subfolder names under a cache context, one per concern.
pub struct CacheDirs;

impl CacheDirs {
    pub const RECORDINGS: &'static str = "recordings";
    pub const TRANSCRIPTS: &'static str = "transcripts";
    pub const RESPONSES: &'static str = "responses";
    pub const DESCRIPTIONS: &'static str = "descriptions";
}

/// External transcription tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperConfig {
    /// Transcription tool executable.
    pub binary: PathBuf,
    /// Model used when the requested language is English.
    pub english_model: String,
    /// Model used for all other languages.
    pub multilingual_model: String,
    /// Output format passed to the tool.
    pub output_format: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("whisper"),
            english_model: "medium.en".to_string(),
            multilingual_model: "large-v3".to_string(),
            output_format: "txt".to_string(),
        }
    }
}

/// Replay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for all cache contexts.
    pub cache_root: PathBuf,

    /// Context identifier separating independent cache groups.
    pub context: String,

    /// Base URL of the local inference server.
    pub ollama_url: String,

    /// Transcription tool settings.
    pub whisper: WhisperConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("replay")
                .join("cache"),
            context: "default".to_string(),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            whisper: WhisperConfig::default(),
        }
    }
}

impl Config {
    /// Directory holding every cache subfolder for this context.
    pub fn context_dir(&self) -> PathBuf {
        self.cache_root.join(&self.context)
    }

    /// A named subfolder under the context directory.
    pub fn subfolder(&self, name: &str) -> PathBuf {
        self.context_dir().join(name)
    }

    /// Materialized audio inputs.
    pub fn recordings_dir(&self) -> PathBuf {
        self.subfolder(CacheDirs::RECORDINGS)
    }

    /// Transcripts written by the external tool.
    pub fn transcripts_dir(&self) -> PathBuf {
        self.subfolder(CacheDirs::TRANSCRIPTS)
    }

    /// Memoized chat responses.
    pub fn responses_dir(&self) -> PathBuf {
        self.subfolder(CacheDirs::RESPONSES)
    }

    /// Memoized image descriptions.
    pub fn descriptions_dir(&self) -> PathBuf {
        self.subfolder(CacheDirs::DESCRIPTIONS)
    }

    /// Transcription model for a language code: the English-tuned model for
    /// English, the multilingual model otherwise.
    pub fn model_for_language(&self, language: &str) -> &str {
        if language.eq_ignore_ascii_case("en") {
            &self.whisper.english_model
        } else {
            &self.whisper.multilingual_model
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_nests_context_and_subfolder() {
        let config = Config {
            cache_root: PathBuf::from("/tmp/replay"),
            context: "s03e01".to_string(),
            ..Config::default()
        };

        assert_eq!(config.context_dir(), PathBuf::from("/tmp/replay/s03e01"));
        assert_eq!(
            config.transcripts_dir(),
            PathBuf::from("/tmp/replay/s03e01/transcripts")
        );
        assert_eq!(
            config.subfolder("extra"),
            PathBuf::from("/tmp/replay/s03e01/extra")
        );
    }

    #[test]
    fn test_model_for_language() {
        let config = Config::default();
        assert_eq!(config.model_for_language("en"), "medium.en");
        assert_eq!(config.model_for_language("EN"), "medium.en");
        assert_eq!(config.model_for_language("pl"), "large-v3");
        assert_eq!(config.model_for_language("de"), "large-v3");
    }
}
