//! Configuration types for the translation engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the fine-tuned checkpoint (config, tokenizer, weights)
    pub model_dir: PathBuf,

    /// Device preference: `auto`, `cpu`, `cuda` or `metal`
    pub device: String,

    /// Optional dtype override (`f32`, `f16`, `bf16`)
    pub dtype: Option<String>,

    /// Prompt token budget on the streaming path
    pub max_input_tokens: usize,

    /// Prompt token budget on the buffered path
    pub buffered_max_input_tokens: usize,

    /// Upper bound on generated tokens
    pub max_output_tokens: usize,

    /// Beam width on the buffered path
    pub num_beams: usize,

    /// Beam score length penalty exponent
    pub length_penalty: f32,

    /// Pending increments allowed between generation and the HTTP writer
    pub stream_channel_capacity: usize,

    /// Generation deadline in seconds; 0 disables it
    pub generation_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            device: "auto".to_string(),
            dtype: None,
            max_input_tokens: 2048,
            buffered_max_input_tokens: 512,
            max_output_tokens: 1024,
            num_beams: 4,
            length_penalty: 1.0,
            stream_channel_capacity: 1,
            generation_timeout_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Load a JSON configuration file; missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream_channel_capacity == 0 {
            return Err(Error::ConfigError(
                "stream_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.num_beams == 0 {
            return Err(Error::ConfigError("num_beams must be at least 1".to_string()));
        }
        if self.max_input_tokens < 2 || self.buffered_max_input_tokens < 2 {
            return Err(Error::ConfigError(
                "input token budgets must allow at least two tokens".to_string(),
            ));
        }
        if self.max_output_tokens == 0 {
            return Err(Error::ConfigError(
                "max_output_tokens must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Option<Duration> {
        (self.generation_timeout_secs > 0).then(|| Duration::from_secs(self.generation_timeout_secs))
    }
}

fn default_model_dir() -> PathBuf {
    if let Ok(from_env) = std::env::var("CODETRANS_MODEL_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codetrans")
        .join("code_translation_model_seq2seq")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_serving_budgets() {
        let config = EngineConfig::default();
        assert_eq!(config.max_input_tokens, 2048);
        assert_eq!(config.buffered_max_input_tokens, 512);
        assert_eq!(config.num_beams, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"stream_channel_capacity": 4, "device": "cpu"}"#).unwrap();
        assert_eq!(config.stream_channel_capacity, 4);
        assert_eq!(config.device, "cpu");
        assert_eq!(config.max_output_tokens, 1024);
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = EngineConfig {
            generation_timeout_secs: 0,
            ..EngineConfig::default()
        };
        assert!(config.generation_timeout().is_none());
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = EngineConfig {
            stream_channel_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::ConfigError(_))));
    }
}
