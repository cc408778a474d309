//! Translation service orchestrator.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::bridge::{GenerationSummary, StreamingBridge, TranslationStream};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{CodeT5Model, DeviceSelector, GenerationParams, TranslationModel};
use crate::request::TranslationRequest;
use crate::runtime::types::Translation;

/// Shared translation runtime.
///
/// Holds the model loaded at startup. Cloning is cheap and every clone
/// shares the same weights.
#[derive(Clone)]
pub struct Translator {
    model: Arc<dyn TranslationModel>,
    config: EngineConfig,
}

impl Translator {
    pub fn new(model: Arc<dyn TranslationModel>, config: EngineConfig) -> Self {
        Self { model, config }
    }

    /// Load the CodeT5 checkpoint named by `config.model_dir`.
    pub fn load(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let device = DeviceSelector::detect_with_preference(&config.device)?;
        let started = Instant::now();
        let model = CodeT5Model::load(&config.model_dir, device, config.dtype.as_deref())?;
        info!(
            "Loaded {} from {} in {:.2}s",
            model.name(),
            config.model_dir.display(),
            started.elapsed().as_secs_f32()
        );
        Ok(Self::new(Arc::new(model), config))
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Translate with beam search and return the whole result at once.
    pub async fn translate(&self, request: &TranslationRequest) -> Result<Translation> {
        let prompt = request.prompt();
        let input_ids = self
            .model
            .encode(&prompt, self.config.buffered_max_input_tokens)?;
        let params = GenerationParams::beam_search(
            self.config.max_output_tokens,
            self.config.num_beams,
            self.config.length_penalty,
        );
        debug!(
            input_tokens = input_ids.len(),
            target = %request.target_language,
            "starting buffered translation"
        );

        let model = self.model.clone();
        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || model.generate(&input_ids, &params));

        let joined = match self.config.generation_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, task)
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => task.await,
        };
        let output = joined
            .map_err(|e| Error::InferenceError(format!("Translation task failed: {}", e)))??;

        Ok(Translation {
            translated_code: output.text,
            tokens_generated: output.tokens_generated,
            finish_reason: output.finish_reason,
            generation_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// Start a greedy translation whose text arrives incrementally.
    ///
    /// Tokenization happens before this returns, so an input the model
    /// cannot encode fails here rather than inside the stream.
    pub fn translate_streaming(&self, request: &TranslationRequest) -> Result<TranslationStream> {
        let prompt = request.prompt();
        let input_ids = self.model.encode(&prompt, self.config.max_input_tokens)?;
        let params = GenerationParams::greedy(self.config.max_output_tokens);
        debug!(
            input_tokens = input_ids.len(),
            target = %request.target_language,
            "starting streaming translation"
        );

        let model = self.model.clone();
        let bridge = StreamingBridge::new(
            self.config.stream_channel_capacity,
            self.config.generation_timeout(),
        );

        Ok(bridge.start(move |sink| {
            let started = Instant::now();
            let output =
                model.generate_streaming(&input_ids, &params, &mut |delta| sink.push(delta))?;
            Ok(GenerationSummary {
                tokens_generated: output.tokens_generated,
                finish_reason: output.finish_reason,
                generation_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            })
        }))
    }
}
