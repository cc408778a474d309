//! Runtime result types.

use serde::Serialize;

use crate::models::FinishReason;

/// Result of a buffered translation.
#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub translated_code: String,
    pub tokens_generated: usize,
    pub finish_reason: FinishReason,
    pub generation_time_ms: f64,
}
