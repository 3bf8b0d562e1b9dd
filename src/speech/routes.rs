//! Message playback endpoints.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::auth::CurrentUser;
use crate::error::{ApiError, SpeechError, json_body};
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/speech", post(speak))
        .route("/api/speech/preload", post(preload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    message_id: String,
}

async fn speak(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    body: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body, "Failed to synthesize speech")?;
    match state.message_speech.synthesize(&body.message_id, &body.text).await {
        Ok(audio) => Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response()),
        Err(SpeechError::EmptyText) => Err(ApiError::bad_request(SpeechError::EmptyText.to_string())),
        Err(e) => {
            error!(message_id = %body.message_id, error = %e, "Text-to-speech error");
            Err(ApiError::internal("Failed to synthesize speech"))
        }
    }
}

async fn preload(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    body: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let body = json_body(body, "Failed to preload speech")?;
    if state.message_speech.should_preload(&body.message_id, &body.text).await {
        debug!(message_id = %body.message_id, "Preloading speech");
        let speech = state.message_speech.clone();
        tokio::spawn(async move {
            if let Err(e) = speech.synthesize(&body.message_id, &body.text).await {
                warn!(message_id = %body.message_id, error = %e, "Speech preload failed");
            }
        });
    }
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::testing::{TestApp, body_json};

    fn speech_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::AUTHORIZATION, "Bearer tok-alice")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn speech_returns_mpeg_audio() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(speech_request(
                "/api/speech",
                serde_json::json!({"text": " Hello there ", "messageId": "m1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"audio:Hello there");
    }

    #[tokio::test]
    async fn empty_text_is_bad_request() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(speech_request("/api/speech", serde_json::json!({"text": "  ", "messageId": "m1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "Text is required and cannot be empty"
        );
    }

    #[tokio::test]
    async fn preload_fills_cache_in_background() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(speech_request(
                "/api/speech/preload",
                serde_json::json!({"text": "Later", "messageId": "m9"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        for _ in 0..50 {
            if app.state.message_speech.contains("m9").await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("preload never cached m9");
    }

    #[tokio::test]
    async fn malformed_body_is_a_json_error() {
        let app = TestApp::new();
        let cases = [
            ("/api/speech", "Failed to synthesize speech"),
            ("/api/speech/preload", "Failed to preload speech"),
        ];
        for (uri, message) in cases {
            let response = app
                .router()
                .oneshot(speech_request(uri, serde_json::json!({"text": 42, "messageId": "m1"})))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            assert_eq!(body_json(response).await["error"], message, "{uri}");
        }
        assert!(!app.state.message_speech.contains("m1").await);
    }

    #[tokio::test]
    async fn speech_requires_user() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(
                Request::post("/api/speech")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"text":"hi","messageId":"m1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
