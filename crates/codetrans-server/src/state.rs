//! Application state shared by every handler

use std::sync::Arc;

use clap::ValueEnum;
use codetrans_core::Translator;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ApiError;

/// Which response shape `/translate-code/` produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
    /// Greedy decoding, chunked `text/plain` body.
    Streaming,
    /// Beam search, single JSON body.
    Buffered,
}

impl TranslationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationMode::Streaming => "streaming",
            TranslationMode::Buffered => "buffered",
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub translator: Arc<Translator>,
    /// Bounds in-flight translations, streamed bodies included.
    pub request_semaphore: Arc<Semaphore>,
    pub mode: TranslationMode,
}

impl AppState {
    pub fn new(translator: Translator, mode: TranslationMode, max_concurrent: usize) -> Self {
        Self {
            translator: Arc::new(translator),
            request_semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            mode,
        }
    }

    /// Wait for a request slot. The permit can be moved into a response body.
    pub async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, ApiError> {
        self.request_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::internal("Server is shutting down"))
    }
}
