//! Code translation endpoint

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use codetrans_core::TranslationRequest;
use serde::Serialize;
use tracing::{error, info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::{AppState, TranslationMode};

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub translated_code: String,
}

/// `POST /translate-code/`
///
/// The body is read raw so malformed JSON still yields the per-field error
/// map instead of the extractor's plain-text rejection.
pub async fn translate_code(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response<Body>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("translate", %request_id, mode = state.mode.as_str());

    async move {
        let request = TranslationRequest::from_json_slice(&body)?;
        info!(
            code_len = request.code.len(),
            from = ?request.input_language,
            to = %request.target_language,
            "translation request"
        );

        match state.mode {
            TranslationMode::Streaming => stream_translation(state, request).await,
            TranslationMode::Buffered => buffered_translation(state, request).await,
        }
    }
    .instrument(span)
    .await
}

async fn buffered_translation(
    state: AppState,
    request: TranslationRequest,
) -> Result<Response<Body>, ApiError> {
    let _permit = state.acquire_permit().await?;

    let translation = state.translator.translate(&request).await.map_err(|err| {
        error!("translation failed: {}", err);
        ApiError::from(err)
    })?;
    info!(
        tokens = translation.tokens_generated,
        "translated in {:.1}ms", translation.generation_time_ms
    );

    Ok(Json(TranslateResponse {
        translated_code: translation.translated_code,
    })
    .into_response())
}

async fn stream_translation(
    state: AppState,
    request: TranslationRequest,
) -> Result<Response<Body>, ApiError> {
    let permit = state.acquire_permit().await?;
    let mut stream = state.translator.translate_streaming(&request)?;

    // Nothing is committed until the first message arrives, so a failure
    // here still gets a proper status code.
    let first = match stream.next_increment().await {
        Some(Ok(text)) => Some(text),
        Some(Err(err)) => {
            error!("translation failed before first increment: {}", err);
            return Err(err.into());
        }
        None => None,
    };

    // The body is polled by hyper after this handler returns, outside the
    // request span, so the span travels with it.
    let span = Span::current();
    let body = async_stream::stream! {
        let _permit = permit;

        if let Some(text) = first {
            yield Ok::<Bytes, codetrans_core::Error>(Bytes::from(text));
        }

        while let Some(item) = stream.next_increment().instrument(span.clone()).await {
            match item {
                Ok(text) => {
                    yield Ok::<Bytes, codetrans_core::Error>(Bytes::from(text));
                }
                Err(err) => {
                    // Headers are out; aborting the body is the only signal left.
                    span.in_scope(|| {
                        error!(
                            delivered = stream.delivered(),
                            "translation failed mid-stream: {}", err
                        )
                    });
                    yield Err(err);
                    break;
                }
            }
        }

        if let Some(summary) = stream.summary() {
            span.in_scope(|| {
                info!(
                    tokens = summary.tokens_generated,
                    finish_reason = ?summary.finish_reason,
                    "stream finished in {:.1}ms", summary.generation_time_ms
                )
            });
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(body))
        .map_err(|e| ApiError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::create_router;
    use axum::http::Request;
    use codetrans_core::testing::ScriptedModel;
    use codetrans_core::{EngineConfig, Translator};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state(model: Arc<ScriptedModel>, mode: TranslationMode) -> AppState {
        AppState::new(Translator::new(model, EngineConfig::default()), mode, 4)
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/translate-code/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn streams_increments_as_plain_text() {
        let model = Arc::new(ScriptedModel::new([
            "System",
            ".out",
            ".println",
            "(\"hi\");",
        ]));
        let app = create_router(state(model.clone(), TranslationMode::Streaming));

        let response = app
            .oneshot(post(
                r#"{"code": "print('hi')", "input_language": "python", "target_language": "java"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"System.out.println(\"hi\");");
        assert_eq!(
            model.last_prompt().as_deref(),
            Some("translate python to java: print('hi')")
        );
    }

    #[tokio::test]
    async fn unsupported_language_never_reaches_model() {
        let model = Arc::new(ScriptedModel::new(["unused"]));
        let app = create_router(state(model.clone(), TranslationMode::Streaming));

        let response = app
            .oneshot(post(r#"{"code": "x", "target_language": "rust"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(
            body["target_language"][0],
            "\"rust\" is not a valid choice."
        );
        assert_eq!(model.generate_calls(), 0);
        assert!(model.last_prompt().is_none());
    }

    #[tokio::test]
    async fn language_names_must_match_exactly() {
        for raw in ["Java", "cpp", " python "] {
            let model = Arc::new(ScriptedModel::new(["unused"]));
            let app = create_router(state(model.clone(), TranslationMode::Streaming));
            let body = serde_json::json!({ "code": "x", "target_language": raw }).to_string();

            let response = app.oneshot(post(&body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{raw:?}");
            let errors = json_body(response).await;
            assert_eq!(
                errors["target_language"][0],
                format!("\"{raw}\" is not a valid choice.")
            );
            assert_eq!(model.generate_calls(), 0);
        }
    }

    #[tokio::test]
    async fn malformed_json_reports_required_fields() {
        let model = Arc::new(ScriptedModel::new(["unused"]));
        let app = create_router(state(model.clone(), TranslationMode::Streaming));

        let response = app.oneshot(post("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body.get("code").is_some());
        assert!(body.get("target_language").is_some());
        assert!(body.get("non_field_errors").is_some());
        assert_eq!(model.generate_calls(), 0);
    }

    #[tokio::test]
    async fn failure_before_first_increment_is_a_500() {
        let model = Arc::new(ScriptedModel::new(["never"]).failing_after(0));
        let app = create_router(state(model, TranslationMode::Streaming));

        let response = app
            .oneshot(post(r#"{"code": "x", "target_language": "java"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("scripted failure"));
    }

    #[tokio::test]
    async fn failure_mid_stream_aborts_body() {
        let model = Arc::new(ScriptedModel::new(["a", "b", "c"]).failing_after(2));
        let app = create_router(state(model, TranslationMode::Streaming));

        let response = app
            .oneshot(post(r#"{"code": "x", "target_language": "python"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn empty_code_streams_empty_body() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let app = create_router(state(model.clone(), TranslationMode::Streaming));

        let response = app
            .oneshot(post(r#"{"code": "", "target_language": "c++"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());
        assert_eq!(model.generate_calls(), 1);
        assert_eq!(model.last_prompt().as_deref(), Some("translate to c++: "));
    }

    #[tokio::test]
    async fn buffered_mode_returns_json() {
        let model = Arc::new(ScriptedModel::new(["int ", "x = 1;"]));
        let app = create_router(state(model, TranslationMode::Buffered));

        let response = app
            .oneshot(post(r#"{"code": "x = 1", "target_language": "c++"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body, serde_json::json!({ "translated_code": "int x = 1;" }));
    }

    #[tokio::test]
    async fn buffered_mode_failure_is_a_500() {
        let model = Arc::new(ScriptedModel::new(["a"]).failing_after(1));
        let app = create_router(state(model, TranslationMode::Buffered));

        let response = app
            .oneshot(post(r#"{"code": "x", "target_language": "java"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(response).await.get("error").is_some());
    }

    #[tokio::test]
    async fn health_reports_model_and_mode() {
        let model = Arc::new(ScriptedModel::new(["a"]));
        let app = create_router(state(model, TranslationMode::Buffered));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "status": "ok", "model": "scripted", "mode": "buffered" })
        );
    }
}
