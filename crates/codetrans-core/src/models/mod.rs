//! Model providers.
//!
//! A provider owns a tokenizer and weights loaded once at startup and is
//! shared read-only across requests. Everything mutable during generation
//! (encoder output, decoder caches, decode buffers) lives on the stack of a
//! single `generate_streaming` call.

pub mod beam;
pub mod codet5;
pub mod device;

use std::ops::ControlFlow;

use serde::Serialize;

use crate::error::Result;

pub use codet5::CodeT5Model;
pub use device::{DeviceKind, DeviceProfile, DeviceSelector};

/// How the next token is chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodingStrategy {
    /// Arg-max at every step; emits text as soon as it decodes.
    Greedy,
    /// Beam search; the winning hypothesis is only known at the end.
    BeamSearch {
        num_beams: usize,
        length_penalty: f32,
        early_stopping: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub strategy: DecodingStrategy,
}

impl GenerationParams {
    pub fn greedy(max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            strategy: DecodingStrategy::Greedy,
        }
    }

    pub fn beam_search(max_new_tokens: usize, num_beams: usize, length_penalty: f32) -> Self {
        Self {
            max_new_tokens,
            strategy: DecodingStrategy::BeamSearch {
                num_beams,
                length_penalty,
                early_stopping: true,
            },
        }
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// End-of-sequence token produced.
    Eos,
    /// `max_new_tokens` reached.
    Length,
    /// The sink asked generation to stop.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub text: String,
    pub tokens_generated: usize,
    pub finish_reason: FinishReason,
}

/// Sequence-to-sequence model exposed to the translation runtime.
pub trait TranslationModel: Send + Sync {
    /// Short identifier reported by health checks and logs.
    fn name(&self) -> &str;

    /// Tokenize a prompt, truncating at `max_length` tokens.
    fn encode(&self, prompt: &str, max_length: usize) -> Result<Vec<u32>>;

    /// Run generation, handing each newly decoded piece of text to `on_delta`.
    ///
    /// Returning [`ControlFlow::Break`] from `on_delta` stops generation at
    /// the next step with [`FinishReason::Cancelled`]. Blocking; call it off
    /// the async runtime.
    fn generate_streaming(
        &self,
        input_ids: &[u32],
        params: &GenerationParams,
        on_delta: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> Result<GenerationOutput>;

    fn generate(&self, input_ids: &[u32], params: &GenerationParams) -> Result<GenerationOutput> {
        let mut no_op = |_delta: &str| ControlFlow::Continue(());
        self.generate_streaming(input_ids, params, &mut no_op)
    }
}

/// Text appended between two successive decodes of a growing id sequence.
pub(crate) fn text_delta(previous: &str, current: &str) -> String {
    if let Some(delta) = current.strip_prefix(previous) {
        return delta.to_string();
    }
    let common = previous
        .chars()
        .zip(current.chars())
        .take_while(|(a, b)| a == b)
        .count();
    current.chars().skip(common).collect()
}

/// Turns successive decodes of a growing id sequence into text increments.
///
/// A decode ending in U+FFFD is an incomplete multi-byte sequence and is held
/// back until a later step completes it; [`DeltaDecoder::finish`] flushes
/// whatever is left so the increments concatenate to the final decode.
#[derive(Debug, Default)]
pub(crate) struct DeltaDecoder {
    assembled: String,
}

impl DeltaDecoder {
    pub(crate) fn step(&mut self, decoded: String) -> Option<String> {
        if decoded.ends_with('\u{FFFD}') {
            return None;
        }
        self.emit(decoded)
    }

    pub(crate) fn finish(&mut self, decoded: String) -> Option<String> {
        self.emit(decoded)
    }

    pub(crate) fn into_text(self) -> String {
        self.assembled
    }

    fn emit(&mut self, decoded: String) -> Option<String> {
        let delta = text_delta(&self.assembled, &decoded);
        self.assembled = decoded;
        (!delta.is_empty()).then_some(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Byte-level stand-in: one id per byte, lossy UTF-8 decode.
    fn decode_bytes(ids: &[u32]) -> String {
        let bytes: Vec<u8> = ids.iter().map(|&id| id as u8).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn run_steps(ids: &[u32]) -> Vec<String> {
        let mut decoder = DeltaDecoder::default();
        let mut increments = Vec::new();
        for end in 1..=ids.len() {
            increments.extend(decoder.step(decode_bytes(&ids[..end])));
        }
        increments.extend(decoder.finish(decode_bytes(ids)));
        increments
    }

    #[test]
    fn delta_is_suffix_when_prefix_matches() {
        assert_eq!(text_delta("public", "public class"), " class");
        assert_eq!(text_delta("", "int"), "int");
    }

    #[test]
    fn delta_falls_back_to_common_prefix() {
        // Byte-level decoders may rewrite the tail once more bytes arrive.
        assert_eq!(text_delta("caf\u{FFFD}", "café!"), "é!");
    }

    #[test]
    fn split_multibyte_char_is_held_back() {
        let ids: Vec<u32> = "café!".bytes().map(u32::from).collect();
        let increments = run_steps(&ids);

        assert!(increments.iter().all(|piece| !piece.contains('\u{FFFD}')));
        assert!(increments.contains(&"é".to_string()));
        assert_eq!(increments.concat(), decode_bytes(&ids));
        assert_eq!(increments.concat(), "café!");
    }

    #[test]
    fn finish_flushes_incomplete_tail() {
        // Generation stopped after the first byte of `é`.
        let ids: Vec<u32> = "caf\u{e9}".bytes().take(4).map(u32::from).collect();
        let increments = run_steps(&ids);

        assert_eq!(increments.concat(), decode_bytes(&ids));
        assert!(increments.last().unwrap().ends_with('\u{FFFD}'));
    }

    #[test]
    fn decoder_keeps_full_text() {
        let mut decoder = DeltaDecoder::default();
        assert_eq!(decoder.step("int".to_string()).as_deref(), Some("int"));
        assert_eq!(decoder.step("int".to_string()), None);
        assert_eq!(decoder.step("int x".to_string()).as_deref(), Some(" x"));
        assert_eq!(decoder.finish("int x".to_string()), None);
        assert_eq!(decoder.into_text(), "int x");
    }
}
