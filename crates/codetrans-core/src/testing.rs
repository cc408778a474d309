//! In-memory model for exercising the runtime without weights.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::{FinishReason, GenerationOutput, GenerationParams, TranslationModel};

/// Emits a fixed list of increments, optionally failing part way through.
pub struct ScriptedModel {
    increments: Vec<String>,
    fail_after: Option<usize>,
    delay: Duration,
    generate_calls: AtomicUsize,
    cancelled: AtomicBool,
    last_prompt: Mutex<Option<String>>,
    last_params: Mutex<Option<GenerationParams>>,
}

impl ScriptedModel {
    pub fn new<I, S>(increments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            increments: increments.into_iter().map(Into::into).collect(),
            fail_after: None,
            delay: Duration::ZERO,
            generate_calls: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            last_prompt: Mutex::new(None),
            last_params: Mutex::new(None),
        }
    }

    /// Fail after emitting `count` increments.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Sleep before each increment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|prompt| prompt.clone())
    }

    pub fn last_params(&self) -> Option<GenerationParams> {
        self.last_params.lock().ok().and_then(|params| params.clone())
    }

    fn scripted_failure(&self, emitted: usize) -> Error {
        Error::InferenceError(format!("scripted failure after {} increments", emitted))
    }
}

impl TranslationModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    /// One id per prompt byte plus a trailing end marker.
    fn encode(&self, prompt: &str, max_length: usize) -> Result<Vec<u32>> {
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        let budget = max_length.saturating_sub(1);
        let mut ids: Vec<u32> = prompt.bytes().take(budget).map(u32::from).collect();
        ids.push(0);
        Ok(ids)
    }

    fn generate_streaming(
        &self,
        _input_ids: &[u32],
        params: &GenerationParams,
        on_delta: &mut dyn FnMut(&str) -> ControlFlow<()>,
    ) -> Result<GenerationOutput> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_params.lock() {
            *last = Some(params.clone());
        }

        let mut text = String::new();
        for (emitted, piece) in self.increments.iter().enumerate() {
            if self.fail_after == Some(emitted) {
                return Err(self.scripted_failure(emitted));
            }
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            text.push_str(piece);
            if on_delta(piece).is_break() {
                self.cancelled.store(true, Ordering::SeqCst);
                return Ok(GenerationOutput {
                    text,
                    tokens_generated: emitted + 1,
                    finish_reason: FinishReason::Cancelled,
                });
            }
        }

        if self.fail_after == Some(self.increments.len()) {
            return Err(self.scripted_failure(self.increments.len()));
        }

        Ok(GenerationOutput {
            text,
            tokens_generated: self.increments.len(),
            finish_reason: FinishReason::Eos,
        })
    }
}
