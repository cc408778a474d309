//! Runtime orchestration: one shared model, one generation pass per request.

mod service;
mod types;

pub use service::Translator;
pub use types::Translation;
