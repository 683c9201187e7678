//! Stability SD3 REST client
//!
//! POSTs the generation form to the configured endpoint and maps the response
//! into `ImageArtifact` / `BackendError`. The image comes back as the raw
//! response body (`Accept: image/*`); metadata rides in the `finish-reason`
//! and `seed` response headers.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::{BackendError, FinishReason, GenerationRequest, ImageArtifact, ImageBackend};

/// HTTP implementation of `ImageBackend` against the SD3 endpoint.
pub struct StabilityBackend {
    client: reqwest::Client,
    url: String,
    default_model: String,
    timeout: Duration,
}

impl StabilityBackend {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            default_model: default_model.into(),
            timeout,
        }
    }

    async fn send(
        &self,
        request: &GenerationRequest,
        api_key: &str,
    ) -> Result<ImageArtifact, BackendError> {
        let mut form = Form::new();
        for (name, value) in request.form_fields(&self.default_model) {
            form = form.text(name, value);
        }
        // The endpoint requires multipart/form-data; the empty file part forces
        // that encoding even though no file is uploaded.
        form = form.part("none", Part::bytes(Vec::new()));

        debug!(url = %self.url, "sending generation request upstream");

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "image/*")
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::http(status.as_u16(), &body));
        }

        let finish_reason = FinishReason::from_header(
            response
                .headers()
                .get("finish-reason")
                .and_then(|v| v.to_str().ok()),
        );
        let seed = response
            .headers()
            .get("seed")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(request.seed);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::transport(format!("response read error: {e}")))?;

        Ok(ImageArtifact {
            bytes,
            seed,
            finish_reason,
        })
    }
}

impl ImageBackend for StabilityBackend {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
        api_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ImageArtifact, BackendError>> + Send + 'a>> {
        Box::pin(self.send(request, api_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use tokio::net::TcpListener;

    fn test_request() -> GenerationRequest {
        serde_json::from_str(r#"{"prompt": "a red barn", "seed": 42}"#).unwrap()
    }

    fn backend_for(url: &str) -> StabilityBackend {
        StabilityBackend::new(
            reqwest::Client::new(),
            url,
            "sd3.5-flash",
            Duration::from_secs(5),
        )
    }

    /// Serve one axum router on an ephemeral port, returning its base URL.
    async fn serve(app: axum::Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn success_returns_artifact_with_header_metadata() {
        let app = axum::Router::new().fallback(|| async {
            (
                StatusCode::OK,
                [("finish-reason", "SUCCESS"), ("seed", "123456")],
                vec![0x89u8, b'P', b'N', b'G'],
            )
        });
        let url = serve(app).await;

        let artifact = backend_for(&url)
            .generate(&test_request(), "sk-test")
            .await
            .unwrap();

        assert_eq!(artifact.seed, 123456);
        assert_eq!(artifact.finish_reason, FinishReason::Success);
        assert_eq!(&artifact.bytes[..], &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn content_filtered_header_is_reported() {
        let app = axum::Router::new().fallback(|| async {
            (
                StatusCode::OK,
                [("finish-reason", "CONTENT_FILTERED"), ("seed", "7")],
                vec![0u8; 4],
            )
        });
        let url = serve(app).await;

        let artifact = backend_for(&url)
            .generate(&test_request(), "sk-test")
            .await
            .unwrap();
        assert_eq!(artifact.finish_reason, FinishReason::ContentFiltered);
    }

    #[tokio::test]
    async fn missing_seed_header_falls_back_to_requested_seed() {
        let app = axum::Router::new()
            .fallback(|| async { (StatusCode::OK, vec![1u8, 2, 3]) });
        let url = serve(app).await;

        let artifact = backend_for(&url)
            .generate(&test_request(), "sk-test")
            .await
            .unwrap();
        assert_eq!(artifact.seed, 42);
    }

    #[tokio::test]
    async fn error_status_becomes_backend_error_with_body() {
        let app = axum::Router::new().fallback(|| async {
            (
                StatusCode::PAYMENT_REQUIRED,
                "you lack the credits required to complete this request",
            )
        });
        let url = serve(app).await;

        let err = backend_for(&url)
            .generate(&test_request(), "sk-test")
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(402));
        assert_eq!(
            err.message,
            "HTTP 402: you lack the credits required to complete this request"
        );
    }

    #[tokio::test]
    async fn bearer_token_and_accept_header_are_sent() {
        let app = axum::Router::new().fallback(
            |headers: axum::http::HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let accept = headers
                    .get("accept")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                if auth == "Bearer sk-live-1" && accept == "image/*" {
                    (StatusCode::OK, vec![1u8]).into_response()
                } else {
                    (StatusCode::UNAUTHORIZED, "bad headers").into_response()
                }
            },
        );
        let url = serve(app).await;

        let result = backend_for(&url).generate(&test_request(), "sk-live-1").await;
        assert!(result.is_ok(), "expected header check to pass: {result:?}");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_transport_error() {
        let backend = backend_for("http://127.0.0.1:1");
        let err = backend
            .generate(&test_request(), "sk-test")
            .await
            .unwrap_err();
        assert!(err.status.is_none());
    }
}
