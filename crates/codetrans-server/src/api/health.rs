//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::{AppState, TranslationMode};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub mode: TranslationMode,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.translator.model_name().to_string(),
        mode: state.mode,
    })
}
