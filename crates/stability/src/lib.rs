//! Upstream abstraction for the Stability image API
//!
//! Defines the `ImageBackend` trait that decouples key rotation from the HTTP
//! transport. `StabilityBackend` implements it against the SD3 REST endpoint;
//! tests substitute scripted backends.
//!
//! Error classification lives here too: `ExhaustionMatcher` decides whether an
//! upstream failure means "this key is out of credits, try the next one" or
//! "real error, stop". The matcher is a value, not a constant — upstream
//! billing wording changes and deployments can override the pattern list.

pub mod classify;
pub mod request;
pub mod sd3;

pub use classify::{BILLING_PATTERNS, ErrorClassification, ExhaustionMatcher};
pub use request::GenerationRequest;
pub use sd3::StabilityBackend;

use std::future::Future;
use std::pin::Pin;

/// How the upstream reported a finished generation.
///
/// Carried in the `finish-reason` response header. Anything other than the
/// known filtered marker is treated as a normal completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Success,
    ContentFiltered,
}

impl FinishReason {
    /// Parse the `finish-reason` header value. Missing header means success.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("CONTENT_FILTERED") => FinishReason::ContentFiltered,
            _ => FinishReason::Success,
        }
    }
}

/// A successful upstream response: the binary image plus its metadata headers.
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    pub bytes: bytes::Bytes,
    /// Seed reported by upstream. Falls back to the requested seed when the
    /// header is absent or malformed.
    pub seed: u64,
    pub finish_reason: FinishReason,
}

/// An upstream failure with its human-readable message and, when the failure
/// was an HTTP error response, the status code for future richer classification.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    pub status: Option<u16>,
}

impl BackendError {
    /// Failure from an HTTP error response. The message embeds the status so
    /// substring classification sees the same text a human would.
    pub fn http(status: u16, body: &str) -> Self {
        Self {
            message: format!("HTTP {status}: {body}"),
            status: Some(status),
        }
    }

    /// Transport-level failure (connect error, timeout) with no status code.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }
}

/// Abstraction over the upstream image-generation call.
///
/// One call per (request, key) attempt. Implementations own their timeout
/// policy; a timeout surfaces as a `BackendError` like any other failure.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn ImageBackend>`).
pub trait ImageBackend: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
        api_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ImageArtifact, BackendError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_content_filtered() {
        assert_eq!(
            FinishReason::from_header(Some("CONTENT_FILTERED")),
            FinishReason::ContentFiltered
        );
    }

    #[test]
    fn finish_reason_success_variants() {
        assert_eq!(
            FinishReason::from_header(Some("SUCCESS")),
            FinishReason::Success
        );
        assert_eq!(FinishReason::from_header(None), FinishReason::Success);
        // Unknown values are not filtered
        assert_eq!(
            FinishReason::from_header(Some("something-new")),
            FinishReason::Success
        );
    }

    #[test]
    fn backend_error_http_embeds_status_in_message() {
        let err = BackendError::http(402, "lack of credits");
        assert_eq!(err.message, "HTTP 402: lack of credits");
        assert_eq!(err.status, Some(402));
        assert_eq!(err.to_string(), "HTTP 402: lack of credits");
    }

    #[test]
    fn backend_error_transport_has_no_status() {
        let err = BackendError::transport("connection refused");
        assert!(err.status.is_none());
        assert_eq!(err.to_string(), "connection refused");
    }
}
