//! Persona upload and question handlers
//!
//! Both endpoints require a bearer token and are rate limited per user id,
//! each against its own quota. The limiter runs before any body processing
//! so a throttled caller costs nothing beyond the check.

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};

use super::{AppState, AuthUser};

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub text: String,
}

pub async fn upload(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    state.upload_limiter.check(&limiter_key(&user.id))?;

    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, declared_len, state.max_pdf_bytes))?
    {
        if field.name() == Some("file") {
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| multipart_error(e, declared_len, state.max_pdf_bytes))?;
            file = Some((content_type, bytes.to_vec()));
            break;
        }
    }

    // A request without a file part never carried a PDF
    let (content_type, bytes) = file.ok_or(Error::UnsupportedMediaType)?;
    let report = state.ingestion.ingest(&user.id, bytes, &content_type).await?;

    Ok(Json(json!({
        "message": "Persona uploaded/updated",
        "chars": report.chars,
    })))
}

pub async fn process_question(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<QuestionRequest>,
) -> Result<Json<Value>> {
    state.ask_limiter.check(&limiter_key(&user.id))?;

    let answer = state.dialogue.ask(&user.id, &body.text).await?;
    Ok(Json(json!({ "answer": answer.answer })))
}

/// A body that blew the router's length limit is a too-large upload, not a
/// server fault. The carried size is the client's declared content length
/// when present.
fn multipart_error(e: MultipartError, declared_len: Option<usize>, max: usize) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            size: declared_len.unwrap_or(0),
            max,
        }
    } else {
        Error::Internal(format!("Multipart read failed: {}", e))
    }
}

// Both throttled routes sit behind AuthUser, so keys are always user ids.
// Any future unauthenticated throttled route must key on network origin.
fn limiter_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::http::test_support::test_state;
    use crate::http::router;

    const BOUNDARY: &str = "x-test-boundary";

    /// Multipart body with one `file` part carrying the given content type.
    fn multipart_body(content_type: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"persona.pdf\"\r\n",
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn login(state: &crate::http::AppState) -> String {
        let user = state
            .users
            .register("alice", "alice@x.com", "pw123")
            .await
            .unwrap();
        state.keys.issue(&user).unwrap()
    }

    async fn upload_once(
        app: axum::Router,
        token: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/personas/upload")
                    .header("authorization", format!("Bearer {}", token))
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(Body::from(multipart_body(content_type, bytes)))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn ask_once(
        app: axum::Router,
        token: &str,
        text: &str,
    ) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/personas/process-question")
                    .header("authorization", format!("Bearer {}", token))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({ "text": text }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_upload_rejects_non_pdf_content_type() {
        let (state, _) = test_state().await;
        let token = login(&state).await;

        let (status, body) =
            upload_once(router(state), &token, "text/plain", b"hello").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "PDF only allowed");
    }

    #[tokio::test]
    async fn test_upload_beyond_body_limit_is_payload_too_large() {
        let (state, _) = test_state().await;
        let token = login(&state).await;

        // Well past the 5 MiB cap plus the router's framing slack
        let oversized = vec![0u8; 6 * 1024 * 1024];
        let (status, body) =
            upload_once(router(state), &token, "application/pdf", &oversized).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "File too large (max 5MB)");
    }

    #[tokio::test]
    async fn test_upload_just_over_cap_is_payload_too_large() {
        let (state, _) = test_state().await;
        let token = login(&state).await;

        // Over the cap but under the body limit, so the pipeline's own
        // size check answers
        let oversized = vec![0u8; 5 * 1024 * 1024 + 1];
        let (status, body) =
            upload_once(router(state), &token, "application/pdf", &oversized).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "File too large (max 5MB)");
    }

    #[tokio::test]
    async fn test_ask_without_persona_is_not_found() {
        let (state, _) = test_state().await;
        let token = login(&state).await;

        let (status, body) = ask_once(router(state), &token, "hi").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "No persona found");
    }

    #[tokio::test]
    async fn test_ask_provider_failure_is_bad_gateway() {
        let (state, mock) = test_state().await;
        let token = login(&state).await;
        let user = state.users.find_by_username("alice").await.unwrap().unwrap();
        state.personas.upsert_full(&user.id, "seed").await.unwrap();
        mock.push_failure("boom");

        let (status, body) = ask_once(router(state), &token, "hi").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["detail"], "LLM provider error");
    }

    #[tokio::test]
    async fn test_ask_quota_exhaustion_is_too_many_requests() {
        let (state, mock) = test_state().await;
        let token = login(&state).await;
        let user = state.users.find_by_username("alice").await.unwrap().unwrap();
        state.personas.upsert_full(&user.id, "seed").await.unwrap();

        for _ in 0..30 {
            mock.push_reply(r#"{"answer": "ok", "persona_update": ""}"#);
            let (status, _) = ask_once(router(state.clone()), &token, "hi").await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = ask_once(router(state), &token, "hi").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["detail"], "Rate limit exceeded. Try again later.");
    }

    #[tokio::test]
    async fn test_upload_and_ask_quotas_are_separate() {
        let (state, mock) = test_state().await;
        let token = login(&state).await;
        let user = state.users.find_by_username("alice").await.unwrap().unwrap();
        state.personas.upsert_full(&user.id, "seed").await.unwrap();

        // Exhaust the upload quota with rejected media types
        for _ in 0..5 {
            let (status, _) =
                upload_once(router(state.clone()), &token, "text/plain", b"x").await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (status, _) = upload_once(router(state.clone()), &token, "text/plain", b"x").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

        // Asking is still allowed
        mock.push_reply(r#"{"answer": "ok", "persona_update": ""}"#);
        let (status, body) = ask_once(router(state), &token, "hi").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "ok");
    }
}
