//! Codetrans Core - source-code translation runtime
//!
//! Turns a validated request into a model prompt, runs a CodeT5-family
//! sequence-to-sequence model on candle, and hands the generated text to an
//! async consumer either all at once or piece by piece.
//!
//! # Example
//!
//! ```ignore
//! use codetrans_core::{EngineConfig, Language, TranslationRequest, Translator};
//!
//! let translator = Translator::load(EngineConfig::default())?;
//! let request = TranslationRequest::new("print('hi')", Language::Java);
//!
//! let mut stream = translator.translate_streaming(&request)?;
//! while let Some(piece) = stream.next_increment().await {
//!     print!("{}", piece?);
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod language;
pub mod models;
pub mod prompt;
pub mod request;
pub mod runtime;
pub mod tokenizer;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use bridge::{GenerationSummary, StreamState, StreamingBridge, TranslationStream};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use language::Language;
pub use models::{
    DecodingStrategy, FinishReason, GenerationOutput, GenerationParams, TranslationModel,
};
pub use prompt::build_prompt;
pub use request::{TranslationRequest, ValidationErrors};
pub use runtime::{Translation, Translator};
