//! Prompt construction for the translation model.

use crate::language::Language;

/// Build the single text prompt the model expects.
///
/// The source language is optional; without it the model infers the input
/// language from the code itself.
pub fn build_prompt(code: &str, target_language: Language, input_language: Option<Language>) -> String {
    match input_language {
        Some(input) => format!("translate {input} to {target_language}: {code}"),
        None => format!("translate to {target_language}: {code}"),
    }
}
