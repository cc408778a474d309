//! CodeT5 (T5 encoder-decoder) loader and generation.

use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use candle_core::{DType, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::t5::{self, T5ForConditionalGeneration};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::beam::{top_candidates, BeamHypothesis, FinishedHypotheses};
use crate::models::device::DeviceProfile;
use crate::models::{
    DecodingStrategy, DeltaDecoder, FinishReason, GenerationOutput, GenerationParams,
    TranslationModel,
};
use crate::tokenizer::Tokenizer;

pub struct CodeT5Model {
    name: String,
    device: DeviceProfile,
    tokenizer: Tokenizer,
    /// Never run directly; each request works on its own clone so decoder
    /// caches are per request while weight tensors stay shared.
    model: T5ForConditionalGeneration,
    decoder_start_token_id: u32,
    eos_token_id: u32,
}

struct RunningBeam {
    hypothesis: BeamHypothesis,
    model: T5ForConditionalGeneration,
    last_token: u32,
}

impl CodeT5Model {
    pub fn load(model_dir: &Path, device: DeviceProfile, dtype: Option<&str>) -> Result<Self> {
        if !model_dir.is_dir() {
            return Err(Error::ModelNotFound(model_dir.display().to_string()));
        }

        let config_str = fs::read_to_string(model_dir.join("config.json"))?;
        let mut config: t5::Config = serde_json::from_str(&config_str)?;
        config.use_cache = true;

        let tokenizer = Tokenizer::from_path(model_dir)?;
        let dtype = device.select_dtype(dtype);
        let vb = load_weights(model_dir, dtype, &device)?;
        let model = T5ForConditionalGeneration::load(vb, &config)?;

        let decoder_start_token_id = config
            .decoder_start_token_id
            .unwrap_or(config.pad_token_id) as u32;
        let eos_token_id = config.eos_token_id as u32;

        let name = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "codet5".to_string());

        info!(
            "Loaded CodeT5 model '{}' ({} layers, vocab {}) on {:?}",
            name,
            config.num_layers,
            tokenizer.vocab_size(),
            device.kind
        );

        Ok(Self {
            name,
            device,
            tokenizer,
            model,
            decoder_start_token_id,
            eos_token_id,
        })
    }

    fn fresh_model(&self) -> T5ForConditionalGeneration {
        let mut model = self.model.clone();
        model.clear_kv_cache();
        model
    }

    fn encode_input(
        &self,
        model: &mut T5ForConditionalGeneration,
        input_ids: &[u32],
    ) -> Result<Tensor> {
        if input_ids.is_empty() {
            return Err(Error::InvalidInput("Encoder input is empty".to_string()));
        }
        let input = Tensor::new(input_ids, &self.device.device)?.unsqueeze(0)?;
        Ok(model.encode(&input)?)
    }

    fn next_token_logits(
        &self,
        model: &mut T5ForConditionalGeneration,
        last_token: u32,
        encoder_output: &Tensor,
    ) -> Result<Tensor> {
        let decoder_input = Tensor::new(&[last_token], &self.device.device)?.unsqueeze(0)?;
        let logits = model.decode(&decoder_input, encoder_output)?.squeeze(0)?;
        Ok(logits.to_dtype(DType::F32)?)
    }

    fn generate_greedy(
        &self,
        input_ids: &[u32],
        max_new_tokens: usize,
        on_delta: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> Result<GenerationOutput> {
        let mut model = self.fresh_model();
        let encoder_output = self.encode_input(&mut model, input_ids)?;

        let mut last_token = self.decoder_start_token_id;
        let mut generated_ids = Vec::new();
        let mut decoder = DeltaDecoder::default();
        let mut finish_reason = FinishReason::Length;

        for _ in 0..max_new_tokens {
            let logits = self.next_token_logits(&mut model, last_token, &encoder_output)?;
            let next = argmax(&logits)?;
            if next == self.eos_token_id {
                finish_reason = FinishReason::Eos;
                break;
            }

            generated_ids.push(next);
            last_token = next;

            let decoded = self.tokenizer.decode(&generated_ids)?;
            if let Some(delta) = decoder.step(decoded) {
                if on_delta(&delta).is_break() {
                    finish_reason = FinishReason::Cancelled;
                    break;
                }
            }
        }

        if finish_reason != FinishReason::Cancelled {
            let decoded = self.tokenizer.decode(&generated_ids)?;
            if let Some(tail) = decoder.finish(decoded) {
                if on_delta(&tail).is_break() {
                    finish_reason = FinishReason::Cancelled;
                }
            }
        }

        debug!(
            tokens = generated_ids.len(),
            ?finish_reason,
            "greedy generation finished"
        );

        Ok(GenerationOutput {
            text: decoder.into_text(),
            tokens_generated: generated_ids.len(),
            finish_reason,
        })
    }

    fn generate_beam_search(
        &self,
        input_ids: &[u32],
        max_new_tokens: usize,
        num_beams: usize,
        length_penalty: f32,
        early_stopping: bool,
        on_delta: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> Result<GenerationOutput> {
        let num_beams = num_beams.max(1);
        let mut root = self.fresh_model();
        let encoder_output = self.encode_input(&mut root, input_ids)?;

        let mut beams = vec![RunningBeam {
            hypothesis: BeamHypothesis {
                tokens: Vec::new(),
                score: 0.0,
            },
            model: root,
            last_token: self.decoder_start_token_id,
        }];
        let mut finished = FinishedHypotheses::new(num_beams, length_penalty);
        let mut finish_reason = FinishReason::Length;

        for step in 0..max_new_tokens {
            let mut log_probs = Vec::with_capacity(beams.len());
            for beam in beams.iter_mut() {
                let logits =
                    self.next_token_logits(&mut beam.model, beam.last_token, &encoder_output)?;
                let row = candle_nn::ops::log_softmax(&logits, D::Minus1)?;
                log_probs.push(row.to_vec1::<f32>()?);
            }
            let scores: Vec<f32> = beams.iter().map(|b| b.hypothesis.score).collect();

            let mut next_beams = Vec::with_capacity(num_beams);
            for (rank, candidate) in top_candidates(&log_probs, &scores, 2 * num_beams)
                .into_iter()
                .enumerate()
            {
                let parent = &beams[candidate.beam];
                if candidate.token == self.eos_token_id {
                    if rank < num_beams {
                        finished.add(BeamHypothesis {
                            tokens: parent.hypothesis.tokens.clone(),
                            score: candidate.score,
                        });
                    }
                    continue;
                }

                let mut tokens = parent.hypothesis.tokens.clone();
                tokens.push(candidate.token);
                next_beams.push(RunningBeam {
                    hypothesis: BeamHypothesis {
                        tokens,
                        score: candidate.score,
                    },
                    model: parent.model.clone(),
                    last_token: candidate.token,
                });
                if next_beams.len() == num_beams {
                    break;
                }
            }

            let best_running = next_beams
                .first()
                .map(|b| b.hypothesis.score)
                .unwrap_or(f32::NEG_INFINITY);
            beams = next_beams;

            if beams.is_empty() || finished.is_done(early_stopping, best_running, step + 1) {
                finish_reason = FinishReason::Eos;
                break;
            }
        }

        if finished.is_empty() {
            for beam in beams {
                finished.add(beam.hypothesis);
            }
        }

        let best = finished
            .into_best()
            .ok_or_else(|| Error::InferenceError("Beam search produced no hypotheses".to_string()))?;
        let text = self.tokenizer.decode(&best.tokens)?;

        debug!(
            tokens = best.tokens.len(),
            num_beams,
            ?finish_reason,
            "beam search finished"
        );

        if !text.is_empty() && on_delta(&text).is_break() {
            finish_reason = FinishReason::Cancelled;
        }

        Ok(GenerationOutput {
            text,
            tokens_generated: best.tokens.len(),
            finish_reason,
        })
    }
}

impl TranslationModel for CodeT5Model {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, prompt: &str, max_length: usize) -> Result<Vec<u32>> {
        self.tokenizer.encode(prompt, max_length)
    }

    fn generate_streaming(
        &self,
        input_ids: &[u32],
        params: &GenerationParams,
        on_delta: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> Result<GenerationOutput> {
        match params.strategy {
            DecodingStrategy::Greedy => {
                self.generate_greedy(input_ids, params.max_new_tokens, on_delta)
            }
            DecodingStrategy::BeamSearch {
                num_beams,
                length_penalty,
                early_stopping,
            } => self.generate_beam_search(
                input_ids,
                params.max_new_tokens,
                num_beams,
                length_penalty,
                early_stopping,
                on_delta,
            ),
        }
    }
}

fn load_weights(
    model_dir: &Path,
    dtype: DType,
    device: &DeviceProfile,
) -> Result<VarBuilder<'static>> {
    let index_path = model_dir.join("model.safetensors.index.json");
    if index_path.exists() {
        let index_data = fs::read_to_string(&index_path)?;
        let index: Value = serde_json::from_str(&index_data)?;
        let weight_map = index
            .get("weight_map")
            .and_then(|m| m.as_object())
            .ok_or_else(|| {
                Error::InvalidInput("Invalid model.safetensors.index.json format".to_string())
            })?;

        let mut shard_files: Vec<String> = weight_map
            .values()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();
        shard_files.sort();
        shard_files.dedup();

        let shard_paths: Vec<PathBuf> = shard_files.iter().map(|f| model_dir.join(f)).collect();
        return Ok(unsafe {
            VarBuilder::from_mmaped_safetensors(&shard_paths, dtype, &device.device)?
        });
    }

    let safetensors_path = model_dir.join("model.safetensors");
    if safetensors_path.exists() {
        return Ok(unsafe {
            VarBuilder::from_mmaped_safetensors(&[safetensors_path], dtype, &device.device)?
        });
    }

    let pth_path = model_dir.join("pytorch_model.bin");
    if pth_path.exists() {
        return Ok(VarBuilder::from_pth(&pth_path, dtype, &device.device)?);
    }

    Err(Error::ModelNotFound(format!(
        "No model.safetensors or pytorch_model.bin in {:?}",
        model_dir
    )))
}

fn argmax(logits: &Tensor) -> Result<u32> {
    let values = logits.to_vec1::<f32>()?;
    let (idx, _) = values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .ok_or_else(|| Error::InferenceError("Empty logits".to_string()))?;
    Ok(idx as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_highest_logit() {
        let logits = Tensor::new(&[0.1f32, 2.5, -1.0, 2.4], &candle_core::Device::Cpu).unwrap();
        assert_eq!(argmax(&logits).unwrap(), 1);
    }

    #[test]
    fn load_rejects_missing_directory() {
        let missing = std::env::temp_dir().join(format!("codetrans-missing-{}", uuid::Uuid::new_v4()));
        let err = CodeT5Model::load(&missing, DeviceProfile::cpu(), None)
            .err()
            .expect("missing model dir should fail");
        assert!(matches!(err, Error::ModelNotFound(_)));
    }

    #[test]
    fn load_reports_missing_weights() {
        let dir = std::env::temp_dir().join(format!("codetrans-noweights-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        assert!(load_weights(&dir, DType::F32, &DeviceProfile::cpu()).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
